//! Pre-bundling of bare (package-name) imports into single browser-ready
//! files, with a persisted name -> served-path manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::options::NormalizedOptions;
use crate::utils::root_relative_url;

pub const MANIFEST_FILE: &str = "metadata.json";

/// The external capability that flattens one package into a single
/// browser-consumable file.
#[async_trait]
pub trait DepBundler: Send + Sync {
    async fn bundle(&self, package: &str, entry: &Path, out_file: &Path) -> anyhow::Result<()>;
}

/// Default bundler: shells out to the `esbuild` binary.
pub struct EsbuildBundler;

#[async_trait]
impl DepBundler for EsbuildBundler {
    async fn bundle(&self, package: &str, entry: &Path, out_file: &Path) -> anyhow::Result<()> {
        let output = tokio::process::Command::new("esbuild")
            .arg(entry)
            .arg("--bundle")
            .arg("--format=esm")
            .arg("--platform=browser")
            .arg("--log-level=silent")
            .arg(format!("--outfile={}", out_file.display()))
            .output()
            .await
            .map_err(|err| anyhow::format_err!("failed to spawn esbuild for {}: {}", package, err))?;
        if !output.status.success() {
            anyhow::bail!(
                "esbuild failed for {}: {}",
                package,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

pub struct PreBundler {
    root: PathBuf,
    cache_dir: PathBuf,
    manifest_path: PathBuf,
    dep_cache: DashMap<String, String>,
    /// Per-package gates enforcing at most one in-flight bundle.
    gates: DashMap<String, Arc<Mutex<()>>>,
    bundler: Arc<dyn DepBundler>,
}

impl PreBundler {
    pub fn new(options: &NormalizedOptions, bundler: Arc<dyn DepBundler>) -> Self {
        Self {
            root: options.root.clone(),
            cache_dir: options.cache_dir.clone(),
            manifest_path: options.cache_dir.join(MANIFEST_FILE),
            dep_cache: DashMap::new(),
            gates: DashMap::new(),
            bundler,
        }
    }

    /// Reloads the persisted manifest. A corrupt or missing manifest is not
    /// fatal: the cache starts empty and repopulates on demand.
    pub async fn load_manifest(&self) {
        let raw = match tokio::fs::read_to_string(&self.manifest_path).await {
            Ok(raw) => raw,
            Err(_) => return,
        };
        match serde_json::from_str::<Manifest>(&raw) {
            Ok(manifest) => {
                for (package, served) in manifest.dependencies {
                    self.dep_cache.insert(package, served);
                }
                tracing::debug!("loaded {} pre-bundled deps from manifest", self.dep_cache.len());
            }
            Err(err) => {
                tracing::warn!("ignoring corrupt pre-bundle manifest: {}", err);
            }
        }
    }

    /// Maps a bare package name to a served path, bundling on first use.
    /// Failures propagate to the caller and are never cached, so the next
    /// request retries.
    pub async fn resolve(&self, package: &str) -> anyhow::Result<String> {
        if let Some(hit) = self.dep_cache.get(package) {
            return Ok(hit.value().clone());
        }

        let gate = self
            .gates
            .entry(package.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _in_flight = gate.lock().await;

        // A concurrent resolve may have finished while we waited.
        if let Some(hit) = self.dep_cache.get(package) {
            return Ok(hit.value().clone());
        }

        tracing::debug!("pre-bundling dependency {}", package);
        let entry = self.root.join("node_modules").join(package);
        let out_file = self
            .cache_dir
            .join(format!("{}.js", package.replace('/', "_")));
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        self.bundler.bundle(package, &entry, &out_file).await?;

        let served = root_relative_url(&self.root, &out_file);
        self.dep_cache.insert(package.to_string(), served.clone());
        self.write_manifest().await?;
        tracing::debug!("pre-bundled {} -> {}", package, served);
        Ok(served)
    }

    async fn write_manifest(&self) -> anyhow::Result<()> {
        let manifest = Manifest {
            dependencies: self
                .dep_cache
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&self.manifest_path, json).await?;
        Ok(())
    }
}
