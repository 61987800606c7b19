use async_trait::async_trait;

use crate::plugin::{Plugin, PluginContext, TransformArgs, TransformOutput};
use crate::utils::ext_of;

const ASSET_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico"];

/// Static assets imported as modules resolve to their served url; plain
/// requests pass through to the raw bytes.
pub struct AssetPlugin;

#[async_trait]
impl Plugin for AssetPlugin {
    fn name(&self) -> &'static str {
        "rapide:asset"
    }

    async fn transform(
        &self,
        _ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> anyhow::Result<Option<TransformOutput>> {
        if !ASSET_EXTENSIONS.contains(&ext_of(args.file).as_str()) || !args.is_module_request {
            return Ok(None);
        }
        let code = format!("export default {};", serde_json::to_string(args.url)?);
        Ok(Some(TransformOutput::new(code, "application/javascript")))
    }
}
