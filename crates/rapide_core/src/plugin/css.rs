use async_trait::async_trait;

use crate::plugin::{Plugin, PluginContext, TransformArgs, TransformOutput};
use crate::server::CLIENT_PATH;
use crate::utils::ext_of;

/// Stylesheets requested as modules become a JS wrapper that applies the
/// style text, self-accepts its own hot updates and removes the style on
/// prune. Plain requests get the raw stylesheet.
pub struct CssPlugin;

#[async_trait]
impl Plugin for CssPlugin {
    fn name(&self) -> &'static str {
        "rapide:css"
    }

    async fn transform(
        &self,
        _ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> anyhow::Result<Option<TransformOutput>> {
        if ext_of(args.file) != "css" {
            return Ok(None);
        }
        let Some(content) = args.content.text() else {
            return Ok(None);
        };

        if !args.is_module_request {
            return Ok(Some(TransformOutput::new(content, "text/css")));
        }

        let id = serde_json::to_string(args.url)?;
        let css = serde_json::to_string(content)?;
        let code = format!(
            r#"import {{ updateStyle, removeStyle, createHotContext }} from "{client}";
import.meta.hot = createHotContext({id});
const id = {id};
const css = {css};
updateStyle(id, css);
import.meta.hot.accept();
import.meta.hot.prune(() => removeStyle(id));
export default css;
"#,
            client = CLIENT_PATH,
            id = id,
            css = css,
        );
        Ok(Some(TransformOutput::new(code, "application/javascript")))
    }
}
