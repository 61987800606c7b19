use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber driven by `RAPIDE_LOG` / `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn enable_tracing_by_env() {
    INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_env("RAPIDE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).init();
    });
}
