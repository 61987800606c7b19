use async_trait::async_trait;

use crate::plugin::{Plugin, PluginContext, TransformArgs, TransformOutput};
use crate::resolve::{rewrite_imports, RewriteContext};
use crate::server::CLIENT_PATH;
use crate::utils::{ext_of, is_script_ext};

/// Serves script modules: records them in the module graph, rewrites their
/// import specifiers and prepends the hot-context preamble.
pub struct EsmPlugin;

#[async_trait]
impl Plugin for EsmPlugin {
    fn name(&self) -> &'static str {
        "rapide:esm"
    }

    async fn transform(
        &self,
        ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> anyhow::Result<Option<TransformOutput>> {
        if !is_script_ext(&ext_of(args.file)) {
            return Ok(None);
        }
        let Some(content) = args.content.text() else {
            return Ok(None);
        };

        // Graph state mirrors exactly what the client has loaded. The whole
        // registration is one synchronous critical section under the lock.
        {
            let mut graph = ctx.graph.lock().await;
            graph.ensure_node(args.url, &args.file.to_string_lossy());
            graph.update_code(&args.file.to_string_lossy(), content);
        }

        let rewrite_ctx = RewriteContext {
            root: &ctx.options.root,
            prebundler: &ctx.prebundler,
        };
        let rewritten = rewrite_imports(content, args.file, &rewrite_ctx).await?;

        let code = format!(
            "import {{ createHotContext }} from \"{client}\";\nimport.meta.hot = createHotContext({url});\n{code}",
            client = CLIENT_PATH,
            url = serde_json::to_string(args.url)?,
            code = rewritten,
        );
        Ok(Some(TransformOutput::new(code, "application/javascript")))
    }
}
