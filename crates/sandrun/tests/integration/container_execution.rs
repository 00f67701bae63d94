use sandrun::{ExecutionRequest, ExecutionStatus};

use super::{container_runner, fixture_source, scenarios};

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_hello_world() {
    scenarios::hello_world(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stdin_is_piped() {
    scenarios::stdin_is_piped(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_missing_colon() {
    scenarios::missing_colon(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_zero_division() {
    scenarios::zero_division(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_infinite_loop() {
    scenarios::infinite_loop(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_javascript() {
    scenarios::concurrent_javascript(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_repeated_runs() {
    scenarios::repeated_runs(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_compile_error_stops_pipeline() {
    scenarios::compile_error_stops_pipeline(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_compiled_with_stdin() {
    scenarios::compiled_with_stdin(&container_runner()).await;
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_network_is_disabled() {
    let result = container_runner()
        .execute(ExecutionRequest::new(fixture_source("network.py"), "python"))
        .await
        .expect("Request rejected");

    assert!(!result.success, "{result:?}");
    assert!(!result.output.contains("connected"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_memory_limit_kills_container() {
    let result = container_runner()
        .execute(ExecutionRequest::new(fixture_source("memory_hog.py"), "python"))
        .await
        .expect("Request rejected");

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(
        result.error.contains("memory") || result.error.contains("MemoryError"),
        "{}",
        result.error
    );
}
