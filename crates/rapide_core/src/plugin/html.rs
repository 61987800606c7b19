use async_trait::async_trait;

use crate::plugin::{Plugin, PluginContext, TransformArgs, TransformOutput};
use crate::server::CLIENT_PATH;
use crate::utils::ext_of;

/// Injects the client-runtime bootstrap into served markup documents.
pub struct HtmlPlugin;

#[async_trait]
impl Plugin for HtmlPlugin {
    fn name(&self) -> &'static str {
        "rapide:html"
    }

    async fn transform(
        &self,
        _ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> anyhow::Result<Option<TransformOutput>> {
        if ext_of(args.file) != "html" {
            return Ok(None);
        }
        let Some(content) = args.content.text() else {
            return Ok(None);
        };
        let bootstrap = format!(
            "<script type=\"module\">import \"{}\";</script>",
            CLIENT_PATH
        );
        Ok(Some(TransformOutput::new(
            format!("{}\n{}", content, bootstrap),
            "text/html",
        )))
    }
}
