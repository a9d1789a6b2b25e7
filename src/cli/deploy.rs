//! Deploy the built template directly to its stack.

use anyhow::Result;
use clap::Args;

use super::common::{
    BuildArgs, CommandContext, HookArgs, blocking, require_stack, stack_request, stage, success,
};
use crate::hooks::HookPhase;

/// Build the template and deploy it to the manifest's stack.
///
/// Custom resources run their `pre` hooks before the deploy and their `post`
/// hooks once it succeeds.
#[derive(Args, Debug, Clone)]
pub struct DeployCommand {
    #[command(flatten)]
    pub build: BuildArgs,

    #[command(flatten)]
    pub hooks: HookArgs,
}

impl DeployCommand {
    /// Run the command.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let output = ctx.build().await?;
        let stack = require_stack(&output.manifest)?.clone();
        let registry = ctx.hook_registry()?;

        let staged = stage(&output, ctx.settings.output.as_deref()).await?;
        ctx.lint_if_requested(&staged.artifacts.template).await?;

        registry.dispatch(HookPhase::Pre, &output.custom_resources).await?;

        let aws = ctx.aws(&output.manifest);
        let artifacts = staged.artifacts.clone();
        let name = stack.name.clone();
        let spinner = ctx.spinner(&format!("Deploying {name}"));
        let result = blocking(move || {
            let tags = stack.tag_pairs();
            aws.deploy(
                &stack_request(&stack, &tags),
                &artifacts.template,
                artifacts.params.as_deref(),
            )
        })
        .await;
        spinner.finish_and_clear();
        let changed = result?;

        registry.dispatch(HookPhase::Post, &output.custom_resources).await?;

        if changed {
            success(&format!("Deployed {name}"));
        } else {
            success(&format!("No changes to deploy for {name}"));
        }
        Ok(())
    }
}
