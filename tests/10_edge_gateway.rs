use serde_json::json;

use sda_portal::edge::{EdgeFunctions, HealthStatus};

mod common;
use common::{stub, ANON_KEY};

fn gateway() -> EdgeFunctions {
    EdgeFunctions::new(&stub().backend_config()).expect("edge gateway")
}

#[tokio::test]
async fn test_invoke_without_payload_uses_get_and_bearer() {
    let response = gateway().invoke("echo", None, Some("stats")).await;

    assert!(response.success, "unexpected failure: {:?}", response.error);
    let data = response.data.expect("echo data");
    assert_eq!(data["method"], json!("GET"));
    assert_eq!(data["action"], json!("stats"));
    assert_eq!(data["authorization"], json!(format!("Bearer {}", ANON_KEY)));
}

#[tokio::test]
async fn test_invoke_with_payload_posts_json_body() {
    let payload = json!({ "property_id": "p-1", "visible": true });
    let response = gateway().invoke("echo", Some(&payload), None).await;

    let data = response.data.expect("echo data");
    assert_eq!(data["method"], json!("POST"));
    assert_eq!(data["body"], payload);
    assert!(data["action"].is_null());

    let recorded = stub().state.requests_to("/functions/v1/echo");
    assert!(recorded
        .iter()
        .all(|r| r.content_type.as_deref().map_or(false, |ct| ct.starts_with("application/json"))));
}

#[tokio::test]
async fn test_non_success_status_becomes_failed_envelope() {
    let response = gateway().invoke("fails", None, None).await;

    assert!(!response.success);
    assert!(response.data.is_none());
    assert_eq!(response.error.as_deref(), Some("Edge Function error: 500 Internal Server Error"));

    let missing = gateway().invoke("missing", None, None).await;
    assert_eq!(missing.error.as_deref(), Some("Edge Function error: 404 Not Found"));
}

#[tokio::test]
async fn test_undecodable_body_is_failure_not_panic() {
    let response = gateway().invoke("garbled", None, None).await;
    assert!(!response.success);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn test_unreachable_gateway_is_failure() {
    let gateway = EdgeFunctions::with_client(reqwest::Client::new(), "http://127.0.0.1:1", ANON_KEY.to_string())
        .expect("edge gateway");
    let response = gateway.invoke("admin-dashboard", None, None).await;
    assert!(!response.success);
    assert!(response.error.is_some());
}

#[tokio::test]
async fn test_health_check_classifies_results() {
    let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let gateway = gateway();

    let all_up = gateway.health_check(&names(&["admin-dashboard", "property-management"])).await;
    assert_eq!(all_up.status, HealthStatus::Healthy);
    assert_eq!((all_up.succeeded, all_up.checked), (2, 2));

    let half = gateway.health_check(&names(&["admin-dashboard", "fails"])).await;
    assert_eq!(half.status, HealthStatus::Degraded);
    let failed = half.results.iter().find(|r| r.function == "fails").expect("fails result");
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap_or_default().starts_with("Edge Function error: 500"));

    let mostly_down = gateway.health_check(&names(&["admin-dashboard", "fails", "missing"])).await;
    assert_eq!(mostly_down.status, HealthStatus::Unhealthy);

    let none = gateway.health_check(&[]).await;
    assert_eq!(none.status, HealthStatus::Healthy);
    assert_eq!(none.checked, 0);
}

#[tokio::test]
async fn test_health_probe_sends_health_action() {
    gateway().health_check(&["security-monitor".to_string()]).await;

    let recorded = stub().state.requests_to("/functions/v1/security-monitor");
    assert!(!recorded.is_empty());
    assert!(recorded
        .iter()
        .all(|r| r.method == "GET" && r.query.contains(&("action".to_string(), "health".to_string()))));
}
