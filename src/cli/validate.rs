use anyhow::Result;
use clap::Args;

use super::common::{BuildArgs, CommandContext, blocking, stage, success};

/// Build the template and validate it with the cloud provider.
#[derive(Args, Debug, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub build: BuildArgs,
}

impl ValidateCommand {
    /// Run the command.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let output = ctx.build().await?;
        let staged = stage(&output, ctx.settings.output.as_deref()).await?;
        ctx.lint_if_requested(&staged.artifacts.template).await?;

        let aws = ctx.aws(&output.manifest);
        let template = staged.artifacts.template.clone();
        let spinner = ctx.spinner("Validating template");
        let result = blocking(move || aws.validate_template(&template)).await;
        spinner.finish_and_clear();
        let response = result?;
        tracing::debug!("validate-template response: {}", response.trim());

        success("Template is valid");
        Ok(())
    }
}
