//! Behavior every backend must share, driven through the public runner

use sandrun::{ExecutionRequest, ExecutionStatus, Runner};

use super::fixture_source;

pub(crate) async fn hello_world(runner: &Runner) {
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("hello.py"), "python"))
        .await
        .expect("Request rejected");

    assert!(result.success, "{result:?}");
    assert_eq!(result.status, ExecutionStatus::Ok);
    assert_eq!(result.output, "Hello, World!\n");
    assert!(result.error.is_empty());
    assert!(result.execution_time < 2.0, "took {}s", result.execution_time);
    assert!(result.explanation.is_none());
}

pub(crate) async fn stdin_is_piped(runner: &Runner) {
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("sum.py"), "python").with_stdin("20\n22\n"))
        .await
        .expect("Request rejected");

    assert!(result.success, "{result:?}");
    assert_eq!(result.output, "42\n");
}

pub(crate) async fn missing_colon(runner: &Runner) {
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("missing_colon.py"), "python"))
        .await
        .expect("Request rejected");

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.error.contains("SyntaxError"), "{}", result.error);
    let hint = result.explanation.expect("missing explanation").quick_hint;
    assert!(hint.contains("colon"), "{hint}");
}

pub(crate) async fn zero_division(runner: &Runner) {
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("zero_division.py"), "python"))
        .await
        .expect("Request rejected");

    assert!(!result.success);
    assert!(result.error.contains("ZeroDivisionError"), "{}", result.error);
    let hint = result.explanation.expect("missing explanation").quick_hint;
    assert!(hint.contains("division by zero"), "{hint}");
}

pub(crate) async fn infinite_loop(runner: &Runner) {
    let limit = runner.config().languages["python"].timeout_seconds as f64;
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("infinite_loop.py"), "python"))
        .await
        .expect("Request rejected");

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.error.contains("timed out"), "{}", result.error);
    assert!(
        result.execution_time >= limit && result.execution_time < limit + 3.0,
        "took {}s",
        result.execution_time
    );
}

pub(crate) async fn concurrent_javascript(runner: &Runner) {
    let (first, second) = tokio::join!(
        runner.execute(ExecutionRequest::new("console.log(1 + 1);", "javascript")),
        runner.execute(ExecutionRequest::new("console.log(2 + 2);", "js")),
    );

    let first = first.expect("Request rejected");
    let second = second.expect("Request rejected");
    assert!(first.success && second.success, "{first:?} {second:?}");
    assert_eq!(first.output, "2\n");
    assert_eq!(second.output, "4\n");
}

pub(crate) async fn repeated_runs(runner: &Runner) {
    let request = ExecutionRequest::new(fixture_source("Main.java"), "java");

    let first = runner.execute(request.clone()).await.expect("Request rejected");
    let second = runner.execute(request).await.expect("Request rejected");

    assert!(first.success, "{first:?}");
    assert!(second.success, "{second:?}");
    assert_eq!(first.output, "6\n");
    assert_eq!(first.output, second.output);
}

pub(crate) async fn compile_error_stops_pipeline(runner: &Runner) {
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("compile_error.c"), "c"))
        .await
        .expect("Request rejected");

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::CompileError);
    assert!(result.output.is_empty());
    assert!(result.error.contains("error"), "{}", result.error);
    let hint = result.explanation.expect("missing explanation").quick_hint;
    assert!(hint.contains("semicolon"), "{hint}");
}

pub(crate) async fn compiled_with_stdin(runner: &Runner) {
    let result = runner
        .execute(ExecutionRequest::new(fixture_source("echo.cpp"), "cpp").with_stdin("first\nsecond\n"))
        .await
        .expect("Request rejected");

    assert!(result.success, "{result:?}");
    assert_eq!(result.output, "first\nsecond\n");
}
