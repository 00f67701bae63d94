use std::sync::Arc;

use sandrun::config::LocalSettings;
use sandrun::runner::compile;
use sandrun::{Config, ExecutionRequest, ExecutionStatus, LocalBackend, Workspace};

use super::{fixture_source, local_runner, scenarios};

#[tokio::test]
async fn test_bash_runs_without_extra_toolchains() {
    let result = local_runner()
        .execute(ExecutionRequest::new("echo \"$HOME\" | grep -q sandrun- && echo isolated", "bash"))
        .await
        .expect("Request rejected");

    assert!(result.success, "{result:?}");
    assert_eq!(result.output, "isolated\n");
}

#[tokio::test]
async fn test_output_is_capped() {
    let runner = local_runner();
    let cap = runner.config().max_output_bytes;
    let result = runner
        .execute(ExecutionRequest::new("yes sandrun | head -c 1000000", "bash"))
        .await
        .expect("Request rejected");

    assert!(result.success, "{result:?}");
    assert!(result.output.ends_with("[output truncated]"));
    assert!(result.output.len() < cap + 64);
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_hello_world() {
    scenarios::hello_world(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_stdin_is_piped() {
    scenarios::stdin_is_piped(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_missing_colon() {
    scenarios::missing_colon(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_zero_division() {
    scenarios::zero_division(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_infinite_loop() {
    scenarios::infinite_loop(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires node"]
async fn test_concurrent_javascript() {
    scenarios::concurrent_javascript(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires a JDK"]
async fn test_repeated_runs() {
    scenarios::repeated_runs(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires gcc"]
async fn test_compile_error_stops_pipeline() {
    scenarios::compile_error_stops_pipeline(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires g++"]
async fn test_compiled_with_stdin() {
    scenarios::compiled_with_stdin(&local_runner()).await;
}

#[tokio::test]
#[ignore = "requires gcc"]
async fn test_compile_error_leaves_no_artifact() {
    let config = Config::default();
    let profile = config.languages["c"].clone();
    let backend = Arc::new(LocalBackend::new(LocalSettings::default(), config.max_output_bytes));
    let workspace = Workspace::create(&std::env::temp_dir()).expect("Failed to create workspace");

    workspace
        .write_file(&profile.source_name(), fixture_source("compile_error.c").as_bytes())
        .await
        .expect("Failed to write source");

    let compiled = compile(backend.as_ref(), &profile, &workspace)
        .await
        .expect("Compile call failed")
        .expect("C is a compiled language");

    assert!(!compiled.success);
    assert!(!compiled.output.is_empty());
    assert!(!workspace.file_exists("program").await.unwrap());

    let failure = compiled.into_failure(&profile);
    assert_eq!(failure.status, ExecutionStatus::CompileError);

    workspace.close().expect("Failed to clean up workspace");
}
