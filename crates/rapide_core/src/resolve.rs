//! Rewrites import specifiers in transformed code into server-resolvable
//! request paths, working over the byte spans the analyzer collected.

use std::path::{Path, PathBuf};

use crate::analyze;
use crate::prebundle::PreBundler;
use crate::utils::{
    is_bare_specifier, resolve_specifier, root_relative_url, POSSIBLE_EXTENSIONS,
};

/// Marker query telling the pipeline to serve the module-wrapped form of a
/// stylesheet or static asset instead of its raw bytes.
pub const IMPORT_QUERY: &str = "?import";

const CODE_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "jsx", "tsx", "vue", "css"];

pub struct RewriteContext<'a> {
    pub root: &'a Path,
    pub prebundler: &'a PreBundler,
}

/// Rewrites every import specifier in `code`:
///
/// - relative/absolute with extension: resolved against the importing file
///   and converted to a root-relative request path;
/// - relative/absolute without extension: candidate extensions are probed
///   against the file system, first hit wins, no hit leaves the specifier
///   untouched (the request will 404 downstream);
/// - bare package names: delegated to the pre-bundle cache;
/// - stylesheet / non-code asset targets get the `?import` marker appended.
pub async fn rewrite_imports(
    code: &str,
    file: &Path,
    ctx: &RewriteContext<'_>,
) -> anyhow::Result<String> {
    let analysis = analyze::analyze_module(code, &file.to_string_lossy())?;
    if analysis.imports.is_empty() {
        return Ok(code.to_string());
    }

    let mut replacements: Vec<(usize, usize, String)> = Vec::new();
    for import in &analysis.imports {
        let specifier = import.specifier.as_str();
        if specifier.starts_with("http:") || specifier.starts_with("https:") {
            continue;
        }

        let ext = specifier_ext(specifier);
        let needs_marker = !ext.is_empty() && (ext == "css" || !CODE_EXTENSIONS.contains(&ext));

        let rewritten = if is_bare_specifier(specifier) {
            let package = package_name_of(specifier);
            Some(ctx.prebundler.resolve(package).await?)
        } else if ext.is_empty() {
            let resolved = resolve_specifier(ctx.root, file, specifier);
            probe_with_extensions(&resolved)
                .await
                .map(|found| root_relative_url(ctx.root, &found))
        } else {
            let resolved = resolve_specifier(ctx.root, file, specifier);
            Some(root_relative_url(ctx.root, &resolved))
        };

        if let Some(mut url) = rewritten {
            if needs_marker {
                url.push_str(IMPORT_QUERY);
            }
            tracing::trace!("rewrote import {} -> {}", specifier, url);
            replacements.push((import.start, import.end, format!("\"{}\"", url)));
        }
    }

    Ok(apply_replacements(code, replacements))
}

/// Probes the candidate extensions against the file system, first existing
/// match wins.
pub async fn probe_with_extensions(resolved: &Path) -> Option<PathBuf> {
    for ext in POSSIBLE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{}.{}", resolved.to_string_lossy(), ext));
        if tokio::fs::metadata(&candidate).await.is_ok() {
            tracing::trace!("probed {}", candidate.display());
            return Some(candidate);
        }
    }
    None
}

fn specifier_ext(specifier: &str) -> &str {
    Path::new(specifier)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
}

/// `react/jsx-runtime` and `@scope/pkg/deep` both pre-bundle at package
/// granularity.
fn package_name_of(specifier: &str) -> &str {
    let mut slashes = specifier.match_indices('/').map(|(idx, _)| idx);
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some(idx) => &specifier[..idx],
        None => specifier,
    }
}

fn apply_replacements(code: &str, mut replacements: Vec<(usize, usize, String)>) -> String {
    replacements.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
    let mut out = code.to_string();
    for (start, end, text) in replacements {
        out.replace_range(start..end, &text);
    }
    out
}
