use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 4000;

/// User-facing options. Every field is optional; `normalize` fills the
/// defaults relative to the project root.
#[derive(Debug, Default, Clone)]
pub struct DevServerOptions {
    pub root: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub entry: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct NormalizedOptions {
    pub root: PathBuf,
    pub public_dir: PathBuf,
    pub entry: PathBuf,
    pub cache_dir: PathBuf,
    pub port: u16,
}

impl DevServerOptions {
    pub fn normalize(self) -> NormalizedOptions {
        let root = self
            .root
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let public_dir = self.public_dir.unwrap_or_else(|| root.join("public"));
        let entry = self.entry.unwrap_or_else(|| root.join("index.html"));
        let cache_dir = self
            .cache_dir
            .unwrap_or_else(|| root.join("node_modules").join(".rapide"));
        NormalizedOptions {
            root,
            public_dir,
            entry,
            cache_dir,
            port: self.port.unwrap_or(DEFAULT_PORT),
        }
    }
}
