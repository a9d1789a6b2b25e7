use anyhow::Result;
use crustomize::core::CrustomizeError;
use crustomize::hooks::{HookPhase, HookRegistry};
use crustomize::resolver::{ResolveOptions, Resolver};
use crustomize::test_utils::RecordingRunner;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use crate::common::{ManifestBuilder, TestProject};

const TEMPLATE: &str = "\
Resources:
  Bucket:
    Type: AWS::S3::Bucket
  Seed:
    Type: Crustomize::SeedTable
    Properties:
      Table: users
      Rows: 10
  Dns:
    Type: Crustomize::DnsRecord
    Properties:
      Name: \"{{values.host}}\"
";

async fn build(project: &TestProject) -> Result<crustomize::resolver::BuildOutput> {
    project.write("base/template.yml", TEMPLATE)?;
    project.write_manifest(&ManifestBuilder::new("./base").value("host", json!("www.example.com")).build())?;
    Resolver::new(Arc::new(RecordingRunner::new()), ResolveOptions::default())
        .build(project.project_path())
        .await
}

#[tokio::test]
async fn test_custom_resources_leave_the_template() -> Result<()> {
    let project = TestProject::new()?;
    let output = build(&project).await?;

    assert_eq!(output.template, json!({"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}}));
    assert!(!output.template_yaml()?.contains("Crustomize::"));

    let suffixes: Vec<&str> = output.custom_resources.keys().map(String::as_str).collect();
    assert_eq!(suffixes, ["DnsRecord", "SeedTable"]);
    let dns = &output.custom_resources["DnsRecord"];
    assert_eq!(dns.logical_id, "Dns");
    assert_eq!(dns.body["Properties"]["Name"], "www.example.com");
    Ok(())
}

#[tokio::test]
async fn test_hooks_receive_phase_and_body() -> Result<()> {
    let project = TestProject::new()?;
    let output = build(&project).await?;

    let seen: Arc<Mutex<Vec<(HookPhase, Value)>>> = Arc::default();
    let mut registry = HookRegistry::new();
    for suffix in ["SeedTable", "DnsRecord"] {
        let seen = seen.clone();
        registry.register_fn(suffix, move |phase, body| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push((phase, body));
                Ok(())
            }
        });
    }

    registry.dispatch(HookPhase::Pre, &output.custom_resources).await?;
    registry.dispatch(HookPhase::Post, &output.custom_resources).await?;

    let seen = seen.lock().unwrap();
    let phases: Vec<HookPhase> = seen.iter().map(|(p, _)| *p).collect();
    assert_eq!(phases, [HookPhase::Pre, HookPhase::Pre, HookPhase::Post, HookPhase::Post]);
    assert_eq!(seen[1].1["Properties"]["Table"], "users");
    assert_eq!(seen[1].1["Type"], "Crustomize::SeedTable");
    Ok(())
}

#[tokio::test]
async fn test_missing_hook_runs_nothing() -> Result<()> {
    let project = TestProject::new()?;
    let output = build(&project).await?;

    let calls = Arc::new(Mutex::new(0));
    let mut registry = HookRegistry::new();
    let counter = calls.clone();
    registry.register_fn("DnsRecord", move |_, _| {
        let counter = counter.clone();
        async move {
            *counter.lock().unwrap() += 1;
            Ok(())
        }
    });

    let err = registry.dispatch(HookPhase::Pre, &output.custom_resources).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrustomizeError>(),
        Some(CrustomizeError::MissingHook { type_suffix }) if type_suffix == "SeedTable"
    ));
    assert_eq!(*calls.lock().unwrap(), 0);
    Ok(())
}

#[tokio::test]
async fn test_command_hooks_from_definitions() -> Result<()> {
    let project = TestProject::new()?;
    let output = build(&project).await?;
    let definitions = project.write(
        "hooks/defs.yml",
        "hooks:\n  SeedTable:\n    command: [seed, --table]\n  DnsRecord:\n    command: [dns-sync]\n",
    )?;

    let runner = Arc::new(RecordingRunner::new());
    let shared: crustomize::process::SharedRunner = runner.clone();
    let mut registry = HookRegistry::new();
    let loaded = registry.load_definitions(definitions.to_str(), &shared)?;
    assert_eq!(loaded, 2);

    registry.dispatch(HookPhase::Post, &output.custom_resources).await?;

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program, "dns-sync");
    assert_eq!(calls[0].args, ["post"]);
    assert_eq!(calls[1].program, "seed");
    assert_eq!(calls[1].args, ["--table", "post"]);
    let stdin: Value = serde_json::from_str(calls[1].options.stdin.as_deref().unwrap())?;
    assert_eq!(stdin["Properties"]["Rows"], 10);
    Ok(())
}

#[tokio::test]
async fn test_failing_command_hook_is_typed() -> Result<()> {
    let project = TestProject::new()?;
    let output = build(&project).await?;
    let definitions = project.write(
        "hooks.yml",
        "hooks:\n  SeedTable:\n    command: [seed]\n  DnsRecord:\n    command: [dns-sync]\n",
    )?;

    let runner = Arc::new(RecordingRunner::new());
    runner.fail("dns-sync", "zone not found");
    let shared: crustomize::process::SharedRunner = runner.clone();
    let mut registry = HookRegistry::new();
    registry.load_definitions(definitions.to_str(), &shared)?;

    let err = registry.dispatch(HookPhase::Pre, &output.custom_resources).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrustomizeError>(),
        Some(CrustomizeError::HookFailed { type_suffix, phase, reason })
            if type_suffix == "DnsRecord" && phase == "pre" && reason == "zone not found"
    ));
    assert_eq!(runner.calls().len(), 1);
    Ok(())
}
