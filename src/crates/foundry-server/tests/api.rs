//! HTTP surface tests: routing, envelopes, workflow CRUD and execution flow

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{fast_dispatch, harness};
use foundry_server::api::create_router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn workflow_body() -> Value {
    json!({
        "projectId": "proj-1",
        "name": "linear",
        "nodes": [
            {"id": "t", "kind": "trigger", "config": {"outputs": [{"id": "prompt", "type": "string"}]}},
            {"id": "llm", "kind": "llm", "config": {"model": "gpt-4o", "userPrompt": "${prompt}"}},
            {"id": "done", "kind": "end", "config": {"targetStatus": "Done"}}
        ],
        "edges": [
            {"id": "e1", "source": "t", "sourcePort": "prompt", "target": "llm", "targetPort": "prompt"},
            {"id": "e2", "source": "llm", "target": "done"}
        ],
        "initialContext": {"prompt": "hi"}
    })
}

#[tokio::test]
async fn test_health() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());
    let response = app.oneshot(request("GET", "/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_workflow_crud_round_trip() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());

    // create
    let response = app
        .clone()
        .oneshot(request("POST", "/api/v1/workflows", Some(workflow_body())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "linear");

    // get
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/workflows/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // update bumps updated_at
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/workflows/{id}"),
            Some(json!({"name": "renamed"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["name"], "renamed");
    assert!(updated["updatedAt"].as_str().unwrap() >= created["updatedAt"].as_str().unwrap());

    // duplicate
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/api/v1/workflows/{id}/duplicate"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let copy = body_json(response).await;
    assert_eq!(copy["name"], "renamed (copy)");

    // delete
    let response = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/v1/workflows/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_error_envelope_shape() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());

    let response = app
        .oneshot(request("GET", "/api/v1/workflows/ghost", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_validate_endpoint_reports_issues() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());

    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/workflows/validate",
            Some(json!({
                "nodes": [
                    {"id": "t1", "kind": "trigger"},
                    {"id": "t2", "kind": "trigger"},
                    {"id": "c", "kind": "command", "config": {"command": "true"}}
                ],
                "edges": [
                    {"id": "e1", "source": "c", "target": "ghost"}
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let codes: Vec<&str> = body["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["code"].as_str().unwrap())
        .collect();
    assert!(codes.contains(&"MULTIPLE_TRIGGERS"));
    assert!(codes.contains(&"UNKNOWN_NODE"));
}

#[tokio::test]
async fn test_execution_lifecycle_over_http() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());

    let response = app
        .clone()
        .oneshot(request("POST", "/api/v1/workflows", Some(workflow_body())))
        .await
        .unwrap();
    let workflow_id = body_json(response).await["id"].as_str().unwrap().to_string();

    // start
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/executions",
            Some(json!({"workflowId": workflow_id})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let execution_id = body_json(response).await["executionId"]
        .as_str()
        .unwrap()
        .to_string();

    // wait for the spawned run to finish
    let mut state = Value::Null;
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/api/v1/executions/{execution_id}"),
                None,
            ))
            .await
            .unwrap();
        state = body_json(response).await;
        if state["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state["status"], "completed", "{state}");
    assert_eq!(state["completionStatus"], "Done");
    assert_eq!(state["portData"]["llm"]["text"], "hello");

    // history records the single llm step
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/executions/{execution_id}/history"),
            None,
        ))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history["steps"].as_array().unwrap().len(), 1);
    assert_eq!(history["steps"][0]["nodeId"], "llm");
}

#[tokio::test]
async fn test_webhook_requires_bearer_token() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());

    let response = app
        .oneshot(request(
            "POST",
            "/exec/some-execution/event",
            Some(json!({"type": "complete"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_automation_validation_at_boundary() {
    let h = harness(fast_dispatch()).await;
    let app = create_router(h.state.clone());

    // statusEnter without triggerStatus violates the invariant
    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/automations",
            Some(json!({
                "projectId": "proj-1",
                "name": "bad",
                "triggerKind": "statusEnter",
                "workflowId": "wf-1"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
