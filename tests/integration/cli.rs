use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;

use crate::common::{ManifestBuilder, TestProject};

fn crustomize(project: &TestProject) -> Command {
    let mut cmd = Command::cargo_bin("crustomize").unwrap();
    cmd.current_dir(project.project_path())
        .env("HOME", project.root_path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("CRUSTOMIZE_HELPERS")
        .env_remove("CRUSTOMIZE_HOOKS");
    cmd
}

fn simple_project() -> TestProject {
    let project = TestProject::new().unwrap();
    project
        .write("base/bucket.yml", "Resources:\n  B:\n    Type: AWS::S3::Bucket\n    Properties:\n      BucketName: \"{{values.name}}\"\n")
        .unwrap();
    project
        .write_manifest(&ManifestBuilder::new("./base").value("name", json!("bucket1")).build())
        .unwrap();
    project
}

#[test]
fn test_apply_prints_only_the_template() {
    let project = simple_project();
    crustomize(&project)
        .arg("apply")
        .assert()
        .success()
        .stdout("Resources:\n  B:\n    Type: AWS::S3::Bucket\n    Properties:\n      BucketName: bucket1\n");
}

#[test]
fn test_apply_writes_output_dir() {
    let project = simple_project();
    project.write("params.yml", "Name: \"{{values.name}}\"\n").unwrap();
    project
        .write_manifest(
            &ManifestBuilder::new("./base").params("./params.yml").value("name", json!("bucket1")).build(),
        )
        .unwrap();

    let out = project.root_path().join("build");
    crustomize(&project)
        .args(["apply", ".", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stdout("")
        .stderr(predicate::str::contains("template.yml"));

    let template = std::fs::read_to_string(out.join("template.yml")).unwrap();
    assert!(template.contains("BucketName: bucket1"));
    let params: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("params.json")).unwrap()).unwrap();
    assert_eq!(params, json!({"Name": "bucket1"}));
}

#[test]
fn test_apply_from_another_directory() {
    let project = simple_project();
    let output = project.run_crustomize(&["apply", "--quiet"]).unwrap();
    output.assert_success();

    let mut cmd = Command::cargo_bin("crustomize").unwrap();
    cmd.current_dir(project.root_path())
        .env("HOME", project.root_path())
        .args(["apply", "project/crustomize.yml"])
        .assert()
        .success()
        .stdout(predicate::str::diff(output.stdout.clone()));
}

#[test]
fn test_missing_manifest_exits_with_error() {
    let project = TestProject::new().unwrap();
    crustomize(&project)
        .arg("apply")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("Manifest file not found"))
        .stderr(predicate::str::contains("suggestion"));
}

#[test]
fn test_unsupported_engine() {
    let project = simple_project();
    crustomize(&project)
        .args(["apply", "--render", "ejs"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unsupported rendering engine: ejs"));
}

#[test]
fn test_deploy_requires_stack() {
    let project = simple_project();
    crustomize(&project)
        .args(["deploy", "--ci"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'stack' is required"));
}

#[test]
fn test_validation_error_lists_violations() {
    let project = TestProject::new().unwrap();
    project.write_manifest("base: ./base\nvalues: {}\nstack:\n  name: 9lives\n").unwrap();
    project
        .run_crustomize(&["apply"])
        .unwrap()
        .assert_failure()
        .assert_stderr_contains("manifest validation failed")
        .assert_stderr_contains("/stack/name");
}

#[test]
fn test_local_config_supplies_engine() {
    let project = TestProject::new().unwrap();
    project.write("base/a.yml", "Name: {{ values.name | quote }}\n").unwrap();
    project
        .write_manifest(&ManifestBuilder::new("./base").value("name", json!("x")).build())
        .unwrap();
    project.write(".crustomizerc", "render: tera\n").unwrap();

    crustomize(&project).arg("apply").assert().success().stdout("Name: x\n");
}

#[test]
fn test_unknown_config_key() {
    let project = simple_project();
    let config = project.write("custom.yml", "render: tera\ncolour: blue\n").unwrap();
    crustomize(&project)
        .arg("--config")
        .arg(&config)
        .arg("apply")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("colour"));
}

#[cfg(unix)]
#[test]
fn test_custom_helper_from_default_directory() {
    let project = TestProject::new().unwrap();
    project.write("base/a.yml", "Greeting: \"{{shout \"hello\"}}\"\n").unwrap();
    project.write_manifest(&ManifestBuilder::new("./base").build()).unwrap();
    project
        .write(
            "crustomize_helpers/shout.yml",
            "helpers:\n  shout:\n    params: [word]\n    command: [sh, -c, 'printf \"%s!\" \"$1\" | tr a-z A-Z', shout]\n",
        )
        .unwrap();

    crustomize(&project).arg("apply").assert().success().stdout("Greeting: HELLO!\n");
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("crustomize").unwrap();
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("apply")
            .and(predicate::str::contains("deploy"))
            .and(predicate::str::contains("execute-change-set")),
    );
}
