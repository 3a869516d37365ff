use funcbox::Runtime;
use serde_json::json;

use super::{body_json, payload, program_available, test_invoker};

// Node only strips types behind a flag on recent releases, so these run on bun
#[tokio::test]
async fn test_sum_success() {
    require_runtime!(Runtime::TypeScript);
    if !program_available("bun") {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker
        .invoke(payload("typescript", "sum.ts").with_event(json!({ "numbers": [1, 2, 3, 4, 5] })))
        .await
        .unwrap();

    assert!(result.is_success(), "logs: {:?}", result.logs);
    assert_eq!(body_json(&result.response), json!({ "result": 15 }));
}

#[tokio::test]
async fn test_sum_invalid_numbers() {
    require_runtime!(Runtime::TypeScript);
    if !program_available("bun") {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let invoker = test_invoker(root.path());

    let result = invoker
        .invoke(payload("ts", "sum.ts").with_event(json!({ "numbers": ["x"] })))
        .await
        .unwrap();

    assert_eq!(result.response.status_code, 400);
}
