mod log;
pub use log::*;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sugar_path::SugarPath;

/// Extensions probed, in order, when an import specifier carries none.
pub const POSSIBLE_EXTENSIONS: &[&str] = &["js", "ts", "jsx", "tsx"];

/// Extensions the esm transform claims.
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "jsx", "tsx"];

/// Extensions read as utf-8 text; everything else is read as raw bytes.
pub const TEXT_EXTENSIONS: &[&str] = &["html", "js", "mjs", "ts", "jsx", "tsx", "vue", "css", "json", "svg"];

pub fn mime_by_ext(ext: &str) -> &'static str {
    match ext {
        "html" => "text/html",
        "js" | "mjs" | "ts" | "jsx" | "tsx" | "vue" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

pub fn is_script_ext(ext: &str) -> bool {
    SCRIPT_EXTENSIONS.contains(&ext)
}

pub fn is_text_ext(ext: &str) -> bool {
    TEXT_EXTENSIONS.contains(&ext)
}

pub fn ext_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Forward-slash form of a path, the key format for both graph indices.
pub fn normalize_file_key(path: &Path) -> String {
    path.normalize().to_slash_lossy().to_string()
}

/// Files under the package dependency directory are opaque to the graph.
pub fn is_dep_path(file: &str) -> bool {
    file.contains("/node_modules/")
}

/// Root-relative request path (`/src/main.js`) for an absolute file path.
pub fn root_relative_url(root: &Path, file: &Path) -> String {
    let rel = file.relative(root);
    format!("/{}", rel.to_slash_lossy().trim_start_matches('/'))
}

/// Resolves an import specifier against the importing file's directory.
/// Specifiers starting with `/` are taken as root-relative request paths.
pub fn resolve_specifier(root: &Path, importer: &Path, specifier: &str) -> PathBuf {
    if let Some(rest) = specifier.strip_prefix('/') {
        root.join(rest).normalize()
    } else {
        let dir = importer.parent().unwrap_or_else(|| Path::new(""));
        dir.join(specifier).normalize()
    }
}

/// A bare specifier names a package rather than a file.
pub fn is_bare_specifier(specifier: &str) -> bool {
    !(specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier.starts_with("http:")
        || specifier.starts_with("https:"))
}

pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
