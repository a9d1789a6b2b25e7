//! Build the template and print it or write the artifacts.

use anyhow::Result;
use clap::Args;

use super::common::{BuildArgs, CommandContext, stage};

/// Build the merged template.
///
/// Without `--output` the template YAML goes to stdout and nothing else is
/// printed there, so the command composes with redirection.
#[derive(Args, Debug, Clone)]
pub struct ApplyCommand {
    #[command(flatten)]
    pub build: BuildArgs,
}

impl ApplyCommand {
    /// Run the command.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let output = ctx.build().await?;

        match ctx.settings.output.as_deref() {
            Some(dir) => {
                let staged = stage(&output, Some(dir)).await?;
                ctx.lint_if_requested(&staged.artifacts.template).await?;
                eprintln!("✓ Wrote {}", staged.artifacts.template.display());
                if let Some(params) = &staged.artifacts.params {
                    eprintln!("✓ Wrote {}", params.display());
                }
            }
            None => {
                if ctx.settings.lint {
                    let staged = stage(&output, None).await?;
                    ctx.lint_if_requested(&staged.artifacts.template).await?;
                }
                print!("{}", output.template_yaml()?);
            }
        }
        Ok(())
    }
}
