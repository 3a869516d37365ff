use std::time::{Duration, Instant};

use funcbox::{InvocationOutcome, IsolationPolicy, ResultSource, Runtime};
use serde_json::json;

use super::{body_json, logged_pids, payload, test_config, test_invoker, workspace_count};

#[tokio::test]
async fn test_sum_success() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker
        .invoke(payload("python", "sum.py").with_event(json!({ "numbers": [1, 2, 3, 4, 5] })))
        .await
        .unwrap();

    assert!(result.is_success(), "logs: {:?}", result.logs);
    assert_eq!(result.result_source, ResultSource::Captured);
    assert_eq!(result.response.status_code, 200);
    assert_eq!(
        result.response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
    assert_eq!(body_json(&result.response), json!({ "result": 15 }));
    assert!(result.logs.contains(&"summing 5 numbers".to_owned()));
}

#[tokio::test]
async fn test_sum_invalid_numbers() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker
        .invoke(payload("python", "sum.py").with_event(json!({ "numbers": [1, "two"] })))
        .await
        .unwrap();

    assert_eq!(result.response.status_code, 400);
    assert_eq!(body_json(&result.response), json!({ "error": "Invalid numbers" }));
}

#[tokio::test]
async fn test_missing_handler() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker.invoke(payload("python", "no_handler.py")).await.unwrap();

    assert_eq!(result.response.status_code, 500);
    assert_eq!(
        body_json(&result.response),
        json!({ "error": "Missing handler: handler" })
    );
}

#[tokio::test]
async fn test_named_handler() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker
        .invoke(payload("python", "no_handler.py").with_handler("main"))
        .await
        .unwrap();

    assert_eq!(result.response.status_code, 200);
    assert_eq!(result.response.body, "wrong name");
}

#[tokio::test]
async fn test_load_failure() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker.invoke(payload("python", "syntax_error.py")).await.unwrap();

    assert_eq!(result.response.status_code, 500);
    let error = body_json(&result.response)["error"].as_str().unwrap().to_owned();
    assert!(error.starts_with("Failed to load handler module:"), "{error}");
    assert!(result.logs.iter().any(|l| l.contains("SyntaxError")));
}

#[tokio::test]
async fn test_handler_exception() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker.invoke(payload("python", "raises.py")).await.unwrap();

    assert_eq!(result.response.status_code, 500);
    assert_eq!(body_json(&result.response), json!({ "error": "boom" }));
    assert!(result.logs.contains(&"about to fail".to_owned()));
    assert!(result.logs.iter().any(|l| l.contains("Traceback")));
    assert!(!result.response.body.contains("Traceback"));
}

#[tokio::test]
async fn test_async_handler() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker
        .invoke(payload("python", "async_handler.py").with_event(json!({ "name": "ada" })))
        .await
        .unwrap();

    assert_eq!(result.response.status_code, 201);
    assert_eq!(result.response.body, "ada");
}

#[tokio::test]
async fn test_log_streams_and_plain_return() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker.invoke(payload("python", "log_streams.py")).await.unwrap();

    assert_eq!(result.response.status_code, 200);
    assert!(result.response.headers.is_empty());
    assert_eq!(result.response.body, "plain string");
    assert!(result.logs.contains(&"from print".to_owned()));
    assert!(result.logs.contains(&"[INFO] from logging".to_owned()));
    assert!(result.logs.contains(&"from stderr".to_owned()));
}

#[tokio::test]
async fn test_spoofed_sentinels_are_logs() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker.invoke(payload("python", "spoof.py")).await.unwrap();

    assert_eq!(result.response.status_code, 200);
    assert_eq!(result.response.body, "real");
    assert!(result.logs.iter().any(|l| l.contains("fake")));
}

#[tokio::test]
async fn test_timeout() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let start = Instant::now();
    let result = invoker
        .invoke(payload("python", "spawns_child.py").with_timeout_ms(200))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(450), "{elapsed:?}");
    assert!(result.timed_out());
    assert_eq!(result.response.status_code, 500);
    assert_eq!(
        body_json(&result.response),
        json!({ "error": "Function timed out after 200 ms" })
    );
    assert_eq!(workspace_count(root.path()), 0);

    let pids = logged_pids(&result.logs);
    assert_eq!(pids.len(), 2, "logs: {:?}", result.logs);
    #[cfg(target_os = "linux")]
    for pid in pids {
        assert!(super::process_gone(pid), "pid {pid} still running");
    }
}

#[tokio::test]
async fn test_base_exception_is_structured_error() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker.invoke(payload("python", "interrupted.py")).await.unwrap();

    assert_eq!(result.result_source, ResultSource::Captured);
    assert_eq!(result.response.status_code, 500);
    assert_eq!(body_json(&result.response), json!({ "error": "stop" }));
    assert!(result.logs.contains(&"stopping early".to_owned()));
    assert!(result.logs.iter().any(|l| l.contains("KeyboardInterrupt")));
}

#[tokio::test]
async fn test_handler_named_like_runner_constant() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    for name in ["__RESULT_END__", "__EVENT_FILE__"] {
        let result = invoker
            .invoke(payload("python", "sum.py").with_handler(name))
            .await
            .unwrap();

        assert_eq!(result.result_source, ResultSource::Captured, "{name}");
        assert_eq!(result.response.status_code, 500);
        assert_eq!(
            body_json(&result.response),
            json!({ "error": format!("Missing handler: {name}") })
        );
    }
}

#[tokio::test]
async fn test_log_line_cap() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.max_log_lines = 5;
    let invoker = funcbox::Invoker::new(config);

    let result = invoker.invoke(payload("python", "noisy.py")).await.unwrap();

    assert_eq!(result.response.body, "done");
    assert_eq!(&result.logs[..5], &["line 0", "line 1", "line 2", "line 3", "line 4"]);
    assert!(
        result
            .logs
            .iter()
            .any(|l| l.starts_with("[runtime] log output truncated"))
    );
}

#[tokio::test]
async fn test_scrubbed_env_home_is_workspace() {
    require_runtime!(Runtime::Python);
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.isolation = IsolationPolicy::ScrubbedEnv;
    let invoker = funcbox::Invoker::new(config);

    let result = invoker.invoke(payload("python", "home.py")).await.unwrap();

    assert_eq!(result.outcome, InvocationOutcome::Completed);
    let home = std::path::Path::new(&result.response.body);
    assert!(home.starts_with(root.path()), "HOME was {home:?}");
    assert!(
        home.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("fn-")
    );
}
