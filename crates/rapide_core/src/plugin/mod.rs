use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::module_graph::ModuleGraph;
use crate::options::NormalizedOptions;
use crate::prebundle::PreBundler;

mod plugin_driver;
pub use plugin_driver::*;
mod html;
pub use html::*;
mod esm;
pub use esm::*;
mod css;
pub use css::*;
mod asset;
pub use asset::*;

/// Shared state a transform can reach: the graph it must keep in sync, the
/// pre-bundle cache for bare imports, and the normalized options.
pub struct PluginContext {
    pub options: Arc<NormalizedOptions>,
    pub graph: Arc<Mutex<ModuleGraph>>,
    pub prebundler: Arc<PreBundler>,
}

#[derive(Debug, Clone)]
pub enum FileContent {
    Text(String),
    Raw(Vec<u8>),
}

impl FileContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformArgs<'a> {
    pub content: &'a FileContent,
    pub file: &'a Path,
    /// Canonical request path; transforms must never change it.
    pub url: &'a str,
    pub is_module_request: bool,
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub mime_type: String,
    pub source_map: Option<String>,
}

impl TransformOutput {
    pub fn new(code: impl Into<String>, mime_type: &str) -> Self {
        Self {
            code: code.into(),
            mime_type: mime_type.to_string(),
            source_map: None,
        }
    }
}

/// A transform in the ordered pipeline. Returning `Ok(None)` means "not
/// applicable", and the next plugin gets its chance.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform(
        &self,
        ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> anyhow::Result<Option<TransformOutput>>;
}

/// The default transform list, in matching order.
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(HtmlPlugin),
        Box::new(EsmPlugin),
        Box::new(CssPlugin),
        Box::new(AssetPlugin),
    ]
}
