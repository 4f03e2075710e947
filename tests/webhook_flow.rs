//! End-to-end webhook scenarios against the real router, a SQLite file and a
//! mocked Teamwork site.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mention_relay::config::Config;
use mention_relay::gateway::{router, AppState};
use mention_relay::responder::DEFAULT_ACK_MESSAGE;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    state: AppState,
    teamwork: MockServer,
    _dir: tempfile::TempDir,
}

async fn harness(configure: impl FnOnce(&mut Config)) -> Harness {
    let teamwork = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.teamwork.base_url = teamwork.uri();
    config.teamwork.api_key = Some("twp_test".into());
    config.teamwork.timeout_secs = 2;
    config.storage.db_path = dir.path().join("events.db").to_string_lossy().into_owned();
    configure(&mut config);
    Harness {
        state: AppState::from_config(config).unwrap(),
        teamwork,
        _dir: dir,
    }
}

async fn post(state: &AppState, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(state, uri, body.to_string()).await
}

async fn post_raw(state: &AppState, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(state, request).await
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(state, request).await
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn message_created(body: &str) -> Value {
    json!({
        "eventCreator": {"id": 9, "firstName": "Ana", "lastName": "Ruiz"},
        "message": {
            "id": 1001,
            "projectId": 506482,
            "categoryName": "General",
            "post": {"id": 5001, "body": body, "dateCreated": "2024-01-05T10:00:00Z"}
        }
    })
}

async fn mount_ack(server: &MockServer, uri_path: &str) {
    Mock::given(method("POST"))
        .and(path(uri_path))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"STATUS": "OK"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn addressed_message_is_saved_and_acknowledged() {
    let h = harness(|_| {}).await;
    Mock::given(method("POST"))
        .and(path("/messages/1001/messagePosts.json"))
        .and(body_partial_json(json!({"messagepost": {"body": DEFAULT_ACK_MESSAGE}})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.teamwork)
        .await;

    let (status, body) = post(
        &h.state,
        "/webhook/message/create",
        message_created("Hello @profesorf, please check"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "saved", "reason": "mensaje guardado"}));

    let (status, stored) = get(&h.state, "/events/message_created/1001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["body_text"], "Hello @profesorf, please check");
    assert_eq!(stored["author_name"], "Ana Ruiz");
    assert_eq!(stored["occurred_at"], "2024-01-05T10:00:00+00:00");
}

#[tokio::test]
async fn unaddressed_message_is_ignored_without_side_effects() {
    let h = harness(|_| {}).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&h.teamwork)
        .await;

    let (status, body) = post(&h.state, "/webhook/message/create", message_created("Hello team")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ignored", "reason": "mensaje no dirigido al profesor forta"})
    );
    let (_, listed) = get(&h.state, "/events").await;
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn reply_survives_failed_parent_lookup() {
    let h = harness(|_| {}).await;
    Mock::given(method("GET"))
        .and(path("/messages/1001.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.teamwork)
        .await;
    mount_ack(&h.teamwork, "/messages/1001/messagePosts.json").await;

    let payload = json!({
        "eventCreator": {"id": 12, "firstName": "Luis", "lastName": "Gil"},
        "messagePost": {
            "id": 88,
            "messageId": 1001,
            "userId": 12,
            "raw-body": "<p>gracias @profesorf</p>",
            "dateCreated": "2024-02-01T08:30:00Z"
        }
    });
    let (status, body) = post(&h.state, "/webhook/message/reply", payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "reason": "respuesta guardada"}));

    let (_, stored) = get(&h.state, "/events/message_reply/88").await;
    assert_eq!(stored["project_id"], Value::Null);
    assert_eq!(stored["thread_id"], 1001);
    assert_eq!(stored["body_text"], "gracias @profesorf");
}

#[tokio::test]
async fn reply_resolves_project_and_relays_answer() {
    let relay = MockServer::start().await;
    let relay_uri = relay.uri();
    let h = harness(move |config| {
        config.relay.enabled = true;
        config.relay.base_url = relay_uri;
        config.relay.api_key = Some("pf-key".into());
    })
    .await;

    Mock::given(method("GET"))
        .and(path("/messages/1001.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post": {"project-id": "777", "category-name": "General", "title": "Presupuesto"}
        })))
        .mount(&h.teamwork)
        .await;
    Mock::given(method("POST"))
        .and(path("/pf/geminia/accion"))
        .and(body_partial_json(json!({
            "id_project": 506482,
            "nombre_proyecto": "TI TEAM",
            "id_usuario": 12,
            "message": "@profesorf resume el presupuesto",
            "status": "ready"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "Resumen listo."})))
        .expect(1)
        .mount(&relay)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/1001/messagePosts.json"))
        .and(body_partial_json(json!({"messagepost": {"body": "Resumen listo."}})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.teamwork)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/1001/messagePosts.json"))
        .and(body_partial_json(json!({"messagepost": {"body": DEFAULT_ACK_MESSAGE}})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.teamwork)
        .await;

    let payload = json!({
        "eventCreator": {"id": 12},
        "messagePost": {"id": 89, "messageId": 1001, "body": "@profesorf resume el presupuesto"}
    });
    let (status, _) = post(&h.state, "/webhook/message/reply", payload).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stored) = get(&h.state, "/events/message_reply/89").await;
    assert_eq!(stored["project_id"], 777);
}

#[tokio::test]
async fn redelivered_webhook_stores_one_row_and_acks_once() {
    let h = harness(|_| {}).await;
    Mock::given(method("POST"))
        .and(path("/tasks/700/comments.json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.teamwork)
        .await;

    let payload = json!({
        "eventCreator": {"id": 3, "firstName": "Eva", "lastName": "Paz"},
        "comment": {
            "id": 55,
            "body": "<p>@profesor forta revisa</p>",
            "userId": 3,
            "objectId": 700,
            "objectType": "task",
            "projectId": 2,
            "dateCreated": "2024-03-01T00:00:00Z"
        }
    });
    for _ in 0..2 {
        let (status, body) = post(&h.state, "/webhook/comment/create", payload.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "saved");
    }

    let (_, listed) = get(&h.state, "/events").await;
    assert_eq!(listed["count"], 1);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = router(h.state.clone()).oneshot(request).await.unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let metrics = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(metrics.contains("mention_relay_events_duplicate_total{kind=\"comment_created\"} 1"));
}

#[tokio::test]
async fn generic_endpoint_dispatches_on_event_field() {
    let h = harness(|_| {}).await;
    mount_ack(&h.teamwork, "/tasks/900/comments.json").await;

    let mut task = json!({
        "eventCreator": {"id": 1},
        "project": {"id": 42},
        "task": {"id": 900, "name": "Revisar", "description": "@profesorf ayuda"}
    });
    task["event"] = json!("task.created");
    let (_, body) = post(&h.state, "/webhook/teamwork", task).await;
    assert_eq!(body, json!({"status": "saved", "reason": "tarea guardada"}));

    let (_, body) = post(&h.state, "/webhook/teamwork", json!({"event": "tasklist.updated"})).await;
    assert_eq!(body, json!({"status": "ignored", "reason": "not a message event"}));
}

#[tokio::test]
async fn non_json_body_is_ignored_not_rejected() {
    let h = harness(|_| {}).await;
    let (status, body) = post_raw(&h.state, "/webhook/message/create", "not json at all".into()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn webhook_secret_guards_webhooks_only() {
    let h = harness(|config| config.gateway.webhook_secret = Some("hook-secret".into())).await;

    let (status, _) = post(&h.state, "/webhook/message/create", message_created("@profesorf")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&h.state, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn slow_acknowledgement_still_answers_with_json() {
    let h = harness(|config| config.gateway.request_timeout_secs = 1).await;
    Mock::given(method("POST"))
        .and(path("/messages/1001/messagePosts.json"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(1500)))
        .expect(1)
        .mount(&h.teamwork)
        .await;

    let (status, body) = post(&h.state, "/webhook/message/create", message_created("@profesorf ayuda")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "saved", "reason": "mensaje guardado"}));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let h = harness(|_| {}).await;
    let big = format!("{{\"raw\": \"{}\"}}", "x".repeat(70_000));
    let (status, _) = post_raw(&h.state, "/webhook/message/create", big).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
