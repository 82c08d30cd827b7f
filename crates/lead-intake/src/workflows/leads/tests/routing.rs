use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::{harness, harness_with, read_json_body, RecordingRelay, ADMIN_EMAIL};
use crate::workflows::leads::router::SESSION_IDENTITY_HEADER;
use crate::workflows::leads::lead_router;

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn contact_request(token: Option<&str>) -> Value {
    json!({
        "fields": {
            "name": "Jane Doe",
            "email": "jane@x.com",
            "message": "Hello",
        },
        "consent": true,
        "mitigation_token": token,
    })
}

#[tokio::test]
async fn lists_every_form() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(get("/api/v1/forms"))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|form| form["id"].as_str())
        .collect();
    assert_eq!(
        ids,
        vec!["consultation", "contact", "newsletter", "newsletter_popup"]
    );
}

#[tokio::test]
async fn successful_submission_returns_cleared_fields() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(post_json(
            "/api/v1/forms/contact/submissions",
            contact_request(Some("tok123")),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["result"]["state"], "success");
    assert_eq!(body["notification"]["title"], "Thank You!");
    assert_eq!(body["fields"]["name"], "");

    let deliveries = h.relay.deliveries();
    assert_eq!(deliveries[0].1.mitigation_token.as_deref(), Some("tok123"));
}

#[tokio::test]
async fn invalid_fields_return_unprocessable_with_errors() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(post_json(
            "/api/v1/forms/contact/submissions",
            json!({
                "fields": { "name": "Jane", "email": "nope", "message": "" },
                "consent": true,
            }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["result"]["state"], "failure");
    assert_eq!(body["fields"]["email"], "nope");
    let kinds: Vec<&str> = body["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|error| error["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["invalid_field", "missing_field"]);
    assert_eq!(h.relay.call_count(), 0);
}

#[tokio::test]
async fn missing_token_is_forbidden() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(post_json(
            "/api/v1/forms/contact/submissions",
            contact_request(None),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.relay.call_count(), 0);
}

#[tokio::test]
async fn relay_rejection_maps_to_bad_gateway() {
    let h = harness_with(RecordingRelay::rejecting(422, r#"{"error":"bad email"}"#));
    let response = lead_router(h.api())
        .oneshot(post_json(
            "/api/v1/forms/contact/submissions",
            contact_request(Some("tok")),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = read_json_body(response).await;
    assert_eq!(body["result"]["reason"], "bad email");
    assert_eq!(body["fields"]["name"], "Jane Doe");
}

#[tokio::test]
async fn unknown_form_is_not_found() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(post_json(
            "/api/v1/forms/brochure/submissions",
            json!({ "fields": {} }),
        ))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn popup_status_flips_after_dismissal() {
    let h = harness();
    let router = lead_router(h.api());

    let before = router
        .clone()
        .oneshot(get("/api/v1/forms/newsletter_popup/popup?device_id=device-1"))
        .await
        .expect("router response");
    assert_eq!(read_json_body(before).await["show"], true);

    let dismissed = router
        .clone()
        .oneshot(post_json(
            "/api/v1/forms/newsletter_popup/popup/dismiss",
            json!({ "device_id": "device-1" }),
        ))
        .await
        .expect("router response");
    assert_eq!(dismissed.status(), StatusCode::NO_CONTENT);

    let after = router
        .oneshot(get("/api/v1/forms/newsletter_popup/popup?device_id=device-1"))
        .await
        .expect("router response");
    assert_eq!(read_json_body(after).await["show"], false);
}

#[tokio::test]
async fn popup_routes_reject_forms_without_prompt() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(get("/api/v1/forms/contact/popup?device_id=device-1"))
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_device_ids_are_rejected_by_popup_routes() {
    let h = harness();
    let router = lead_router(h.api());

    let dismissed = router
        .clone()
        .oneshot(post_json(
            "/api/v1/forms/newsletter_popup/popup/dismiss",
            json!({ "device_id": "  " }),
        ))
        .await
        .expect("router response");
    assert_eq!(dismissed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_json_body(dismissed).await["error"],
        "device_id must not be blank"
    );

    let status = router
        .clone()
        .oneshot(get("/api/v1/forms/newsletter_popup/popup?device_id="))
        .await
        .expect("router response");
    assert_eq!(status.status(), StatusCode::BAD_REQUEST);

    let missing = router
        .oneshot(get("/api/v1/forms/newsletter_popup/popup"))
        .await
        .expect("router response");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.flags.writes(), 0);
}

#[tokio::test]
async fn blank_device_id_on_submission_sets_no_flag() {
    let h = harness();
    let router = lead_router(h.api());

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/forms/newsletter_popup/submissions",
            json!({
                "fields": { "email": "subscriber@x.com" },
                "consent": true,
                "device_id": "",
            }),
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.flags.writes(), 0);

    let status = router
        .oneshot(get("/api/v1/forms/newsletter_popup/popup?device_id=device-2"))
        .await
        .expect("router response");
    assert_eq!(read_json_body(status).await["show"], true);
}

#[tokio::test]
async fn malformed_body_gets_json_error() {
    let h = harness();
    let response = lead_router(h.api())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/forms/contact/submissions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"fields\": "))
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
    assert_eq!(h.relay.call_count(), 0);
}

#[tokio::test]
async fn submission_history_requires_admin() {
    let h = harness();
    let router = lead_router(h.api());

    let anonymous = router
        .clone()
        .oneshot(get("/api/v1/admin/submissions"))
        .await
        .expect("router response");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let outsider = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/admin/submissions")
                .header(SESSION_IDENTITY_HEADER, "mallory@example.com")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        read_json_body(outsider).await["error"],
        "Access denied. Your account is not authorized to view this page."
    );
}

#[tokio::test]
async fn admin_sees_recorded_submissions() {
    let h = harness();
    let router = lead_router(h.api());

    router
        .clone()
        .oneshot(post_json(
            "/api/v1/forms/contact/submissions",
            contact_request(Some("tok")),
        ))
        .await
        .expect("router response");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/admin/submissions?limit=10")
                .header(SESSION_IDENTITY_HEADER, ADMIN_EMAIL)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let records = body.as_array().expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["form_id"], "contact");
    assert_eq!(records[0]["outcome"]["status"], "delivered");
}
