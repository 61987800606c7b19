use crate::plugin::{Plugin, PluginContext, TransformArgs, TransformOutput};

pub struct PluginDriver {
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl PluginDriver {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Offers the content to each plugin in order; the first one that
    /// produces output wins.
    pub async fn transform(
        &self,
        ctx: &PluginContext,
        args: TransformArgs<'_>,
    ) -> anyhow::Result<Option<TransformOutput>> {
        for plugin in &self.plugins {
            let output = plugin.transform(ctx, args.clone()).await?;
            if output.is_some() {
                tracing::trace!("{} handled {}", plugin.name(), args.url);
                return Ok(output);
            }
        }
        Ok(None)
    }
}
