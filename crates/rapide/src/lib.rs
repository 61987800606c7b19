//! Thin public surface over the rapide engine.

use std::sync::Arc;

pub use rapide_core::{
    enable_tracing_by_env, ChangeEvent, ChangeKind, DepBundler, DevServer, DevServerOptions,
    EsbuildBundler, HmrPayload, HmrUpdate, ModuleGraph, Plugin, UpdateKind, CLIENT_PATH, HMR_PATH,
};

pub struct Rapide {
    server: DevServer,
}

impl Rapide {
    /// Serves until the process is stopped.
    pub async fn listen(self) -> anyhow::Result<()> {
        self.server.listen().await
    }

    /// The running engine, for embedding or driving change events from a
    /// watcher.
    pub fn server(&self) -> &DevServer {
        &self.server
    }
}

/// Builds a dev server over `options` with the default transform list and
/// the esbuild-backed pre-bundler.
pub async fn rapide(options: DevServerOptions) -> anyhow::Result<Rapide> {
    let server = DevServer::new(options).await?;
    tracing::debug!("dev server created at {}", server.options().root.display());
    Ok(Rapide { server })
}

/// Same, with an injected bundling capability (tests, sandboxed setups).
pub async fn rapide_with_bundler(
    options: DevServerOptions,
    bundler: Arc<dyn DepBundler>,
) -> anyhow::Result<Rapide> {
    let server =
        DevServer::with_parts(options, rapide_core::default_plugins(), bundler).await?;
    Ok(Rapide { server })
}
