//! The on-demand request/transform pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::Mutex;

use crate::module_graph::ModuleGraph;
use crate::options::NormalizedOptions;
use crate::plugin::{FileContent, PluginContext, PluginDriver, TransformArgs};
use crate::prebundle::PreBundler;
use crate::utils::{ext_of, is_text_ext, mime_by_ext};

/// Failure classes of a single request. Resolution and read failures make
/// the response a 404 (a vanished file is a race, not an error); transform
/// failures surface as a 500-equivalent and never take down the server.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unable to resolve {url}")]
    Unresolved { url: String },
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transform of {path:?} failed: {message}")]
    Transform { path: PathBuf, message: String },
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub body: Vec<u8>,
    pub content_type: String,
}

pub struct Pipeline {
    pub options: Arc<NormalizedOptions>,
    pub graph: Arc<Mutex<ModuleGraph>>,
    pub prebundler: Arc<PreBundler>,
    driver: PluginDriver,
}

impl Pipeline {
    pub fn new(
        options: Arc<NormalizedOptions>,
        graph: Arc<Mutex<ModuleGraph>>,
        prebundler: Arc<PreBundler>,
        driver: PluginDriver,
    ) -> Self {
        Self {
            options,
            graph,
            prebundler,
            driver,
        }
    }

    /// Resolves a request path to a source file (static-asset root first,
    /// project root as fallback), reads it and offers it to the transform
    /// list; unmatched content is served raw with an extension-derived
    /// content type.
    pub async fn transform_request(&self, raw_url: &str) -> Result<PipelineOutput, PipelineError> {
        let (url, query) = split_query(raw_url);
        let is_module_request = query_flag(query, "import") || query_flag(query, "t");
        tracing::debug!("request {} (module: {})", url, is_module_request);

        let file = if url == "/" {
            self.options.entry.clone()
        } else {
            let rel = url.trim_start_matches('/');
            let public_candidate = self.options.public_dir.join(rel);
            if tokio::fs::metadata(&public_candidate).await.is_ok() {
                public_candidate
            } else {
                self.options.root.join(rel)
            }
        };

        let ext = ext_of(&file);
        let content = if is_text_ext(&ext) {
            match tokio::fs::read_to_string(&file).await {
                Ok(text) => FileContent::Text(text),
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    return Err(PipelineError::Unresolved { url: url.to_string() });
                }
                Err(source) => return Err(PipelineError::Read { path: file, source }),
            }
        } else {
            match tokio::fs::read(&file).await {
                Ok(bytes) => FileContent::Raw(bytes),
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    return Err(PipelineError::Unresolved { url: url.to_string() });
                }
                Err(source) => return Err(PipelineError::Read { path: file, source }),
            }
        };

        let ctx = PluginContext {
            options: self.options.clone(),
            graph: self.graph.clone(),
            prebundler: self.prebundler.clone(),
        };
        let args = TransformArgs {
            content: &content,
            file: &file,
            url,
            is_module_request,
        };
        let output = self
            .driver
            .transform(&ctx, args)
            .await
            .map_err(|err| PipelineError::Transform {
                path: file.clone(),
                message: format!("{:#}", err),
            })?;

        match output {
            Some(out) => {
                let mut body = out.code.into_bytes();
                if let Some(map) = out.source_map {
                    body.extend_from_slice(
                        format!(
                            "\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}",
                            BASE64.encode(map.as_bytes())
                        )
                        .as_bytes(),
                    );
                }
                Ok(PipelineOutput { body, content_type: out.mime_type })
            }
            None => {
                let body = match content {
                    FileContent::Text(text) => text.into_bytes(),
                    FileContent::Raw(bytes) => bytes,
                };
                Ok(PipelineOutput {
                    body,
                    content_type: mime_by_ext(&ext).to_string(),
                })
            }
        }
    }
}

fn split_query(raw_url: &str) -> (&str, &str) {
    match raw_url.split_once('?') {
        Some((url, query)) => (url, query),
        None => (raw_url, ""),
    }
}

fn query_flag(query: &str, key: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair == key || pair.starts_with(&format!("{}=", key)))
}
