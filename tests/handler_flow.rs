//! End-to-end runs of `JobHandler` against an in-process engine and temp dirs.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{config, write_template, FakeEngine, Outcome, TXT2IMG};
use comfyui_job_adapter::config::{CompletionMode, Substitution};
use comfyui_job_adapter::{JobHandler, JobResult};
use serde_json::{json, Value};

fn job(id: &str, workflow: &str, params: Value) -> Value {
    json!({ "id": id, "input": { "workflow_name": workflow, "params": params } })
}

fn error_of(result: &JobResult) -> String {
    match result {
        JobResult::Failure(f) => f.error.clone(),
        other => panic!("expected failure, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// History completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_mode_returns_path_under_output_dir() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine.clone());

    let result = handler
        .handle(&job("job-1", "txt2img", json!({ "steps": 20, "seed": 7, "prompt": "a lighthouse" })))
        .await;

    let expected = output.path().join("job-1/job-1_00001_.png");
    assert_eq!(result, JobResult::success(expected.to_string_lossy()));

    let graph = engine.last_submitted();
    assert_eq!(graph["3"]["inputs"]["steps"], json!(20));
    assert_eq!(graph["3"]["inputs"]["seed"], json!(7));
    assert_eq!(graph["6"]["inputs"]["text"], "a lighthouse");
    assert_eq!(graph["9"]["inputs"]["filename_prefix"], "job-1/job-1");
    assert!(engine.status_calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn persistent_root_receives_moved_artifact() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    let persistent = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let mut conf = config(workflows.path(), output.path());
    conf.persistent_output_dir = Some(persistent.path().to_path_buf());
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&conf, engine);

    let result = handler.handle(&job("j2", "txt2img", json!({ "steps": 4 }))).await;

    assert_eq!(result, JobResult::success("j2/j2_00001_.png"));
    assert!(persistent.path().join("j2/j2_00001_.png").is_file());
    assert!(!output.path().join("j2/j2_00001_.png").exists());
}

#[tokio::test]
async fn caller_prefix_overrides_job_directory() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(
        workflows.path(),
        "prefixed",
        r#"{ "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "__param:filename_prefix__" } } }"#,
    );

    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine.clone());

    let result = handler
        .handle(&job("j3", "prefixed", json!({ "filename_prefix": "batch/portrait" })))
        .await;

    assert!(result.is_success(), "{:?}", result);
    assert_eq!(engine.last_submitted()["9"]["inputs"]["filename_prefix"], "batch/portrait");
    assert!(output.path().join("batch/portrait_00001_.png").is_file());
}

#[tokio::test]
async fn engine_failure_is_reported() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::Fail("KSampler: bad sampler".into())));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine);

    let result = handler.handle(&job("j4", "txt2img", json!({}))).await;
    assert!(error_of(&result).contains("KSampler: bad sampler"));
}

#[tokio::test]
async fn completion_without_images_is_an_error() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::NoImages));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine);

    let result = handler.handle(&job("j5", "txt2img", json!({ "steps": 1 }))).await;
    assert!(error_of(&result).contains("without producing an image"));
    let v = serde_json::to_value(&result).unwrap();
    assert!(v.get("image_pod_path").is_none());
}

#[tokio::test]
async fn non_object_outputs_are_returned_as_raw_output() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::Outputs(json!("done"))));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine);

    let result = handler.handle(&job("j5b", "txt2img", json!({ "steps": 1 }))).await;
    match &result {
        JobResult::Failure(f) => {
            assert!(f.error.contains("string"), "{}", f.error);
            assert_eq!(f.raw_output, Some(json!("done")));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    let v = serde_json::to_value(&result).unwrap();
    assert_eq!(v["raw_output"], "done");
}

#[tokio::test]
async fn silent_engine_times_out() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let mut conf = config(workflows.path(), output.path());
    conf.output_timeout = Duration::from_millis(60);
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::Silent));
    let handler = JobHandler::new(&conf, engine);

    let result = handler.handle(&job("j6", "txt2img", json!({}))).await;
    assert!(error_of(&result).contains("no output appeared"));
}

// ---------------------------------------------------------------------------
// Filesystem completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filesystem_mode_finds_artifact_by_prefix() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let mut conf = config(workflows.path(), output.path());
    conf.completion_mode = CompletionMode::Filesystem;
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&conf, engine.clone());

    let result = handler.handle(&job("fs-1", "txt2img", json!({ "steps": 8 }))).await;

    let expected = output.path().join("fs-1/fs-1_00001_.png");
    assert_eq!(result, JobResult::success(expected.to_string_lossy()));
    assert_eq!(engine.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn filesystem_mode_follows_literal_template_prefix() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(
        workflows.path(),
        "exported",
        r#"{
            "3": { "class_type": "KSampler", "inputs": { "steps": "__param:steps__" } },
            "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "ComfyUI", "images": ["8", 0] } }
        }"#,
    );

    let mut conf = config(workflows.path(), output.path());
    conf.completion_mode = CompletionMode::Filesystem;
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&conf, engine.clone());

    let result = handler.handle(&job("j1", "exported", json!({ "steps": 8 }))).await;

    let expected = output.path().join("ComfyUI_00001_.png");
    assert_eq!(result, JobResult::success(expected.to_string_lossy()));
    assert_eq!(engine.last_submitted()["9"]["inputs"]["filename_prefix"], "ComfyUI");
}

#[tokio::test]
async fn filesystem_mode_times_out_without_artifact() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let mut conf = config(workflows.path(), output.path());
    conf.completion_mode = CompletionMode::Filesystem;
    conf.output_timeout = Duration::from_millis(50);
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::Silent));
    let handler = JobHandler::new(&conf, engine);

    let result = handler.handle(&job("fs-2", "txt2img", json!({}))).await;
    let err = error_of(&result);
    assert!(err.contains("no output appeared"), "{}", err);
    assert!(err.contains("fs-2"), "{}", err);
}

// ---------------------------------------------------------------------------
// Input and template problems
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_template_is_reported_not_raised() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine.clone());

    let result = handler.handle(&job("j7", "does_not_exist", json!({}))).await;
    assert!(error_of(&result).contains("does_not_exist.json"));
    assert!(engine.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_input_lists_problems() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine);

    let result = handler.handle(&json!({ "id": "j8", "input": { "params": {} } })).await;
    assert!(error_of(&result).contains("'workflow_name' is required"));
}

#[tokio::test]
async fn escaping_prefix_is_rejected_before_submission() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&config(workflows.path(), output.path()), engine.clone());

    let result = handler
        .handle(&job("j9", "txt2img", json!({ "filename_prefix": "../../etc/x" })))
        .await;
    assert!(error_of(&result).contains("filename_prefix"));
    assert!(engine.submitted.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Substitution strategy and aliases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_strategy_and_aliases_apply_through_handler() {
    let workflows = tempfile::tempdir().expect("create temp dir");
    let output = tempfile::tempdir().expect("create temp dir");
    write_template(workflows.path(), "txt2img", TXT2IMG);

    let mut conf = config(workflows.path(), output.path());
    conf.substitution = Substitution::Text;
    conf.param_aliases.insert("positive".into(), "prompt".into());
    let engine = Arc::new(FakeEngine::new(output.path(), Outcome::WriteImage));
    let handler = JobHandler::new(&conf, engine);

    let resolved = handler
        .resolve("j10", "txt2img", json!({ "steps": 20, "positive": "fog" }).as_object().unwrap())
        .await
        .unwrap();
    assert_eq!(resolved.graph["3"]["inputs"]["steps"], json!(20));
    assert_eq!(resolved.graph["6"]["inputs"]["text"], "fog");
    assert_eq!(resolved.graph["3"]["inputs"]["seed"], "__param:seed__");
    assert_eq!(resolved.filename_prefix, "j10/j10");
}
