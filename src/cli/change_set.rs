//! Change set commands.
//!
//! Change sets are named `<stack>-cs-<hash>` after the rendered template, so
//! `create-change-set`, `execute-change-set` and `delete-change-set` run over
//! the same crustomize directory agree on the name without it being passed
//! around. `--name` overrides it.

use anyhow::Result;
use clap::Args;

use super::common::{
    BuildArgs, CommandContext, HookArgs, blocking, require_stack, stack_request, stage, success,
};
use crate::aws::change_set_name;
use crate::hooks::HookPhase;
use crate::resolver::BuildOutput;

/// Create a change set for the built template and print its description.
#[derive(Args, Debug, Clone)]
pub struct CreateChangeSetCommand {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Change set name
    #[arg(long)]
    pub name: Option<String>,
}

/// Execute the change set for the built template.
#[derive(Args, Debug, Clone)]
pub struct ExecuteChangeSetCommand {
    #[command(flatten)]
    pub build: BuildArgs,

    #[command(flatten)]
    pub hooks: HookArgs,

    /// Change set name
    #[arg(long)]
    pub name: Option<String>,
}

/// Delete the change set for the built template.
#[derive(Args, Debug, Clone)]
pub struct DeleteChangeSetCommand {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Change set name
    #[arg(long)]
    pub name: Option<String>,
}

fn resolve_name(explicit: Option<String>, stack: &str, output: &BuildOutput) -> Result<String> {
    match explicit {
        Some(name) => Ok(name),
        None => Ok(change_set_name(stack, &output.template_yaml()?)),
    }
}

impl CreateChangeSetCommand {
    /// Run the command.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let output = ctx.build().await?;
        let stack = require_stack(&output.manifest)?.clone();
        let name = resolve_name(self.name, &stack.name, &output)?;

        let staged = stage(&output, ctx.settings.output.as_deref()).await?;
        ctx.lint_if_requested(&staged.artifacts.template).await?;

        let aws = ctx.aws(&output.manifest);
        let artifacts = staged.artifacts.clone();
        let spinner = ctx.spinner(&format!("Creating change set {name}"));
        let change_set = name.clone();
        let result = blocking(move || {
            let tags = stack.tag_pairs();
            aws.create_change_set(
                &stack_request(&stack, &tags),
                &change_set,
                &artifacts.template,
                artifacts.params.as_deref(),
            )
        })
        .await;
        spinner.finish_and_clear();
        let described = result?;

        println!("{}", serde_json::to_string_pretty(&described)?);
        success(&format!("Created change set {name}"));
        Ok(())
    }
}

impl ExecuteChangeSetCommand {
    /// Run the command, dispatching hooks around the execution.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let output = ctx.build().await?;
        let stack = require_stack(&output.manifest)?.name.clone();
        let name = resolve_name(self.name, &stack, &output)?;
        let registry = ctx.hook_registry()?;

        registry.dispatch(HookPhase::Pre, &output.custom_resources).await?;

        let aws = ctx.aws(&output.manifest);
        let spinner = ctx.spinner(&format!("Executing change set {name}"));
        let (s, n) = (stack.clone(), name.clone());
        let result = blocking(move || aws.execute_change_set(&s, &n)).await;
        spinner.finish_and_clear();
        result?;

        registry.dispatch(HookPhase::Post, &output.custom_resources).await?;

        success(&format!("Executed change set {name} on {stack}"));
        Ok(())
    }
}

impl DeleteChangeSetCommand {
    /// Run the command.
    pub async fn execute(self, ctx: CommandContext) -> Result<()> {
        let output = ctx.build().await?;
        let stack = require_stack(&output.manifest)?.name.clone();
        let name = resolve_name(self.name, &stack, &output)?;

        let aws = ctx.aws(&output.manifest);
        let (s, n) = (stack.clone(), name.clone());
        blocking(move || aws.delete_change_set(&s, &n)).await?;

        success(&format!("Deleted change set {name}"));
        Ok(())
    }
}
