use std::time::{Duration, Instant};

use funcbox::{InvocationOutcome, InvocationPayload, Runtime};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{body_json, payload, test_invoker, workspace_count};

#[tokio::test]
async fn test_workspace_removed_after_every_outcome() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let cases = [
        payload("python", "sum.py").with_event(json!({ "numbers": [1] })),
        payload("python", "raises.py"),
        payload("python", "syntax_error.py"),
        payload("python", "no_handler.py"),
        payload("python", "sleeps.py").with_timeout_ms(150),
    ];

    for case in cases {
        invoker.invoke(case).await.unwrap();
        assert_eq!(workspace_count(root.path()), 0);
    }
}

#[tokio::test]
async fn test_validation_failure_spawns_nothing() {
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let response = invoker
        .handle(InvocationPayload::new("python", "   "))
        .await;

    assert!(!response.ok);
    assert!(response.response.is_none());
    assert_eq!(response.error.as_deref(), Some("Code must not be empty"));
    assert_eq!(workspace_count(root.path()), 0);
}

#[tokio::test]
async fn test_handle_wire_shape() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let response = invoker
        .handle(payload("python", "sum.py").with_event(json!({ "numbers": [7, 8] })))
        .await;
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["ok"], json!(true));
    assert_eq!(value["response"]["statusCode"], json!(200));
    assert_eq!(value["logs"], json!(["summing 2 numbers"]));
    assert!(value.get("error").is_none());
}

#[tokio::test]
async fn test_timeout_is_still_ok_response() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let response = invoker
        .handle(payload("python", "sleeps.py").with_timeout_ms(150))
        .await;

    assert!(response.ok);
    assert_eq!(response.response.unwrap().status_code, 500);
}

#[tokio::test]
async fn test_concurrent_invocations_are_isolated() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let tasks: Vec<_> = (0..8)
        .map(|id| {
            let invoker = invoker.clone();
            tokio::spawn(async move {
                let result = invoker
                    .invoke(payload("python", "echo.py").with_event(json!({ "id": id })))
                    .await
                    .unwrap();
                (id, result)
            })
        })
        .collect();

    for task in tasks {
        let (id, result) = task.await.unwrap();
        assert_eq!(body_json(&result.response), json!({ "id": id }));
        assert_eq!(result.logs, vec![format!("id={id}")]);
    }
    assert_eq!(workspace_count(root.path()), 0);
}

#[tokio::test]
async fn test_concurrency_limit_queues_invocations() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let mut config = super::test_config(root.path());
    config.max_concurrent = 1;
    let invoker = funcbox::Invoker::new(config);

    let first = {
        let invoker = invoker.clone();
        tokio::spawn(async move {
            invoker
                .invoke(payload("python", "sleeps.py").with_timeout_ms(300))
                .await
                .unwrap()
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let second = invoker
        .invoke(payload("python", "echo.py").with_event(json!({ "id": 1 })))
        .await
        .unwrap();

    assert!(first.await.unwrap().timed_out());
    assert_eq!(second.outcome, InvocationOutcome::Completed);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_cancellation_kills_handler() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = invoker
        .invoke_with_cancel(payload("python", "sleeps.py"), cancel)
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(result.outcome, InvocationOutcome::Cancelled);
    assert_eq!(
        body_json(&result.response),
        json!({ "error": "Invocation cancelled" })
    );
    assert_eq!(workspace_count(root.path()), 0);
}

#[tokio::test]
async fn test_aborted_invocation_still_cleans_up() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let task = tokio::spawn(async move { invoker.invoke(payload("python", "sleeps.py")).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    task.abort();
    let _ = task.await;

    assert_eq!(workspace_count(root.path()), 0);
}
