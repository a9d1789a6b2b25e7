use anyhow::Result;
use crustomize::core::{ConstraintKind, CrustomizeError, ValidationTarget};
use crustomize::resolver::{ResolveOptions, Resolver};
use crustomize::test_utils::RecordingRunner;
use serde_json::json;
use std::sync::Arc;

use crate::common::{ManifestBuilder, TestProject};

fn resolver() -> Resolver {
    Resolver::new(Arc::new(RecordingRunner::new()), ResolveOptions::default())
}

fn tera() -> Resolver {
    let options = ResolveOptions {
        render: Some("tera".to_string()),
        ..ResolveOptions::default()
    };
    Resolver::new(Arc::new(RecordingRunner::new()), options)
}

/// Base tags from a rendered value, overlay tags appended after them
#[tokio::test]
async fn test_overlay_tags_append_to_rendered_base() -> Result<()> {
    let project = TestProject::new()?;
    project.write(
        "base/template.yml",
        "Resources:\n  B:\n    Type: AWS::S3::Bucket\n    Properties:\n      Tags:\n        - Key: Name\n          Value: \"{{values.name}}\"\n",
    )?;
    project.write(
        "overlays/dev.yml",
        "Resources:\n  B:\n    Properties:\n      Tags:\n        - Key: Env\n          Value: dev\n",
    )?;
    project.write_manifest(
        &ManifestBuilder::new("./base")
            .overlay("./overlays/dev.yml")
            .value("name", json!("bucket1"))
            .build(),
    )?;

    let output = resolver().build(project.project_path()).await?;
    assert_eq!(
        output.template["Resources"]["B"]["Properties"]["Tags"],
        json!([{"Key": "Name", "Value": "bucket1"}, {"Key": "Env", "Value": "dev"}])
    );
    assert!(output.params.is_none());
    Ok(())
}

#[tokio::test]
async fn test_array_merge_policies() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "a: [1, 2]\nb: [1, 2]\n")?;
    project.write("append.yml", "a: [3, 4]\n")?;
    project.write("replace.yml", "b: [3, 4]\n")?;
    project.write_manifest(
        &ManifestBuilder::new("./base")
            .overlay("./append.yml")
            .overlay_with("./replace.yml", "replace")
            .build(),
    )?;

    let output = resolver().build(project.project_path()).await?;
    assert_eq!(output.template, json!({"a": [1, 2, 3, 4], "b": [3, 4]}));
    Ok(())
}

#[tokio::test]
async fn test_builds_are_byte_identical() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/20-outputs.yml", "Outputs:\n  Url:\n    Value: !GetAtt Site.WebsiteURL\n")?;
    project.write(
        "base/10-resources.yml",
        "Resources:\n  Site:\n    Type: AWS::S3::Bucket\n    Properties:\n      BucketName: !Sub \"${AWS::StackName}-{{values.suffix}}\"\n",
    )?;
    project.write("overlays/extra.json", r#"{"Resources": {"Site": {"DeletionPolicy": "Retain"}}}"#)?;
    project.write_manifest(
        &ManifestBuilder::new("./base")
            .overlay("./overlays/extra.json")
            .value("suffix", json!("site"))
            .build(),
    )?;

    let first = resolver().build(project.project_path()).await?.template_yaml()?;
    let second = resolver().build(project.project_path()).await?.template_yaml()?;
    assert_eq!(first, second);
    assert!(first.find("Resources").unwrap() < first.find("Outputs").unwrap());
    assert!(first.contains("!GetAtt"));
    assert!(first.contains("${AWS::StackName}-site"));
    Ok(())
}

#[tokio::test]
async fn test_patches_apply_in_order_after_merge() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "Resources:\n  A:\n    Type: X\n")?;
    project.write("overlays/o.yml", "Outputs:\n  Debug: yes\n")?;
    project.write_manifest(
        &ManifestBuilder::new("./base")
            .overlay("./overlays/o.yml")
            .patch(json!({"op": "add", "path": "/Description", "value": "first"}))
            .patch(json!({"op": "replace", "path": "/Description", "value": "second"}))
            .patch(json!({"op": "remove", "path": "/Outputs/Debug"}))
            .build(),
    )?;

    let output = resolver().build(project.project_path()).await?;
    assert_eq!(output.template["Description"], "second");
    assert_eq!(output.template["Outputs"], json!({}));
    Ok(())
}

#[tokio::test]
async fn test_patch_order_matters() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "Resources: {}\n")?;
    project.write_manifest(
        &ManifestBuilder::new("./base")
            .patch(json!({"op": "remove", "path": "/Description"}))
            .patch(json!({"op": "add", "path": "/Description", "value": "x"}))
            .build(),
    )?;

    let err = resolver().build(project.project_path()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrustomizeError>(),
        Some(CrustomizeError::PatchError { index: 0, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_vars_expand_before_validation() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "Name: \"{{values.bucket}}\"\n")?;
    project.write("overlays/dev.yml", "Env: dev\n")?;
    project.write_manifest(
        &ManifestBuilder::new("./base")
            .var("env", "dev")
            .overlay("./overlays/${env}.yml")
            .stack("app-${env}")
            .tag("Env", "${env}")
            .value("bucket", json!("assets-${env}"))
            .build(),
    )?;

    let output = resolver().build(project.project_path()).await?;
    assert_eq!(output.template, json!({"Name": "assets-dev", "Env": "dev"}));
    let stack = output.manifest.stack.as_ref().unwrap();
    assert_eq!(stack.name, "app-dev");
    assert_eq!(stack.tag_pairs(), [("Env".to_string(), "dev".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_manifest_violations_are_located() -> Result<()> {
    let project = TestProject::new()?;
    project.write_manifest(
        "base: ./base\nvalues: {}\noverlays:\n  - file: ./o.yml\n    arrayMerge: sideways\nextra: 1\n",
    )?;

    let err = resolver().build(project.project_path()).await.unwrap_err();
    let Some(CrustomizeError::ValidationError {
        target,
        violations,
    }) = err.downcast_ref::<CrustomizeError>()
    else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(*target, ValidationTarget::Manifest);
    assert!(violations.iter().any(|v| v.path == "/overlays/0/arrayMerge" && v.constraint == ConstraintKind::Enum));
    assert!(violations.iter().any(|v| v.constraint == ConstraintKind::UnknownKey));
    Ok(())
}

#[tokio::test]
async fn test_values_schema_beside_base() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "Port: {{values.port}}\n")?;
    project.write(
        "values.schema.json",
        r#"{"type": "object", "required": ["port"], "properties": {"port": {"type": "integer"}}}"#,
    )?;
    project.write_manifest(&ManifestBuilder::new("./base").value("port", json!("eighty")).build())?;

    let err = resolver().build(project.project_path()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrustomizeError>(),
        Some(CrustomizeError::ValidationError { target: ValidationTarget::Values, violations })
            if violations[0].path == "/port"
    ));

    project.write_manifest(&ManifestBuilder::new("./base").value("port", json!(80)).build())?;
    let output = resolver().build(project.project_path()).await?;
    assert_eq!(output.template, json!({"Port": 80}));
    Ok(())
}

#[tokio::test]
async fn test_params_render_to_json() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "Resources: {}\n")?;
    project.write(
        "params.yml",
        "- ParameterKey: Bucket\n  ParameterValue: {{ values.bucket }}\n- ParameterKey: Env\n  ParameterValue: {{ env.CRUSTOMIZE_IT_ENV }}\n",
    )?;
    let env_file = project.write("env.yml", "CRUSTOMIZE_IT_ENV: staging\n")?;
    project.write_manifest(
        &ManifestBuilder::new("./base").params("./params.yml").value("bucket", json!("b1")).build(),
    )?;

    let options = ResolveOptions {
        render: Some("tera".to_string()),
        env_file: Some(env_file),
        ..ResolveOptions::default()
    };
    let output = Resolver::new(Arc::new(RecordingRunner::new()), options)
        .build(project.project_path())
        .await?;
    assert_eq!(
        output.params,
        Some(json!([
            {"ParameterKey": "Bucket", "ParameterValue": "b1"},
            {"ParameterKey": "Env", "ParameterValue": "staging"}
        ]))
    );

    let out = project.root_path().join("build");
    let artifacts = output.write_to(&out).await?;
    assert_eq!(artifacts.template, out.join("template.yml"));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(artifacts.params.unwrap())?)?;
    assert_eq!(written[0]["ParameterValue"], "b1");
    Ok(())
}

#[tokio::test]
async fn test_engines_agree() -> Result<()> {
    let handlebars = TestProject::new()?;
    handlebars.write(
        "base/a.yml",
        "Name: {{quote values.name}}\nShort: {{trunc values.name 3}}\nEncoded: {{toBase64 values.name}}\nRegion: {{valueOrDefault values.region \"us-east-1\"}}\n",
    )?;
    handlebars.write_manifest(&ManifestBuilder::new("./base").value("name", json!("website")).build())?;

    let tera_project = TestProject::new()?;
    tera_project.write(
        "base/a.yml",
        "Name: {{ values.name | quote }}\nShort: {{ values.name | trunc(n=3) }}\nEncoded: {{ values.name | toBase64 }}\nRegion: {{ values.region | valueOrDefault(fallback=\"us-east-1\") }}\n",
    )?;
    tera_project.write_manifest(&ManifestBuilder::new("./base").value("name", json!("website")).build())?;

    let expected =
        json!({"Name": "website", "Short": "web", "Encoded": "d2Vic2l0ZQ==", "Region": "us-east-1"});
    assert_eq!(resolver().build(handlebars.project_path()).await?.template, expected);
    assert_eq!(tera().build(tera_project.project_path()).await?.template, expected);
    Ok(())
}

#[tokio::test]
async fn test_cloud_lookups_in_templates() -> Result<()> {
    let project = TestProject::new()?;
    project.write(
        "base/a.yml",
        "Url: \"{{lookupCfOutput \"network\" \"VpcId\"}}\"\nParam: \"{{getParameter \"/app/db\"}}\"\n",
    )?;
    project.write_manifest("base: ./base\nprofile: ops\nvalues: {}\n")?;

    let runner = Arc::new(RecordingRunner::new());
    runner.respond("describe-stacks", r#"[{"OutputKey": "VpcId", "OutputValue": "vpc-123"}]"#);
    runner.respond("get-parameter", "db.internal\n");
    let output = Resolver::new(runner.clone(), ResolveOptions::default())
        .build(project.project_path())
        .await?;

    assert_eq!(output.template, json!({"Url": "vpc-123", "Param": "db.internal"}));
    for call in runner.calls() {
        assert!(call.args.windows(2).any(|w| w[0] == "--profile" && w[1] == "ops"));
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_output_is_typed() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "Url: \"{{lookupCfOutput \"network\" \"Nope\"}}\"\n")?;
    project.write_manifest(&ManifestBuilder::new("./base").build())?;

    let runner = Arc::new(RecordingRunner::new());
    runner.respond("describe-stacks", r#"[{"OutputKey": "VpcId", "OutputValue": "vpc-123"}]"#);
    let err = Resolver::new(runner, ResolveOptions::default())
        .build(project.project_path())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CrustomizeError>(),
        Some(CrustomizeError::OutputNotFound { stack, key }) if stack == "network" && key == "Nope"
    ));
    Ok(())
}

#[tokio::test]
async fn test_manifest_cache_reuses_loads() -> Result<()> {
    let project = TestProject::new()?;
    project.write("base/a.yml", "A: 1\n")?;
    project.write_manifest(&ManifestBuilder::new("./base").build())?;

    let resolver = resolver();
    let first = resolver.cache().load(project.project_path()).await?;
    let second = resolver.cache().load(project.project_path().join("crustomize.yml")).await?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.cache().len(), 1);
    Ok(())
}
