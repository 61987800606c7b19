use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rapide::{rapide_with_bundler, DepBundler, DevServerOptions, Rapide};

/// Bundler stand-in: writes a stub bundle instead of invoking esbuild.
pub struct StubBundler;

#[async_trait]
impl DepBundler for StubBundler {
    async fn bundle(&self, package: &str, _entry: &Path, out_file: &Path) -> anyhow::Result<()> {
        tokio::fs::write(out_file, format!("export default \"{}\";", package)).await?;
        Ok(())
    }
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    /// A small project: an html entry, a script chain with one
    /// self-accepting leaf, a stylesheet and a bare import.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        tokio::fs::create_dir_all(&src).await.unwrap();

        write(
            dir.path().join("index.html"),
            "<html><body><script type=\"module\" src=\"/src/main.js\"></script></body></html>",
        )
        .await;
        write(
            src.join("main.js"),
            "import { render } from \"./app.js\";\nimport \"./style.css\";\nrender();",
        )
        .await;
        write(
            src.join("app.js"),
            "export function render() {}\nimport.meta.hot.accept();",
        )
        .await;
        write(src.join("style.css"), "body { margin: 0; }").await;

        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn options(&self) -> DevServerOptions {
        DevServerOptions {
            root: Some(self.dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    pub async fn write_file(&self, rel: &str, content: &str) {
        write(self.dir.path().join(rel), content).await;
    }

    pub async fn remove_file(&self, rel: &str) {
        tokio::fs::remove_file(self.dir.path().join(rel)).await.unwrap();
    }

    pub async fn server(&self) -> Rapide {
        rapide_with_bundler(self.options(), Arc::new(StubBundler))
            .await
            .unwrap()
    }
}

async fn write(path: std::path::PathBuf, content: &str) {
    tokio::fs::write(path, content).await.unwrap();
}
