use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use gatepass_server::config::{Config, ServerMode};
use gatepass_server::models::{Attendee, TicketType};
use gatepass_server::routes::{create_routes, AppState};
use gatepass_server::services::{RedemptionCodec, TicketIssuer};
use gatepass_server::stores::MemoryStore;

const KEY: [u8; 32] = *b"an-example-32-byte-signing-key!!";

fn local_config() -> Config {
    Config {
        database_url: String::new(),
        port: 0,
        server_mode: ServerMode::Local {
            server_id: Some("gate-A".to_string()),
        },
        redemption_secret: KEY,
        global_server_url: None,
        sync_api_key: None,
        sync_timeout: Duration::from_secs(5),
    }
}

struct Fixture {
    app: Router,
    store: Arc<MemoryStore>,
    guard_id: Uuid,
    code: String,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let guard = store.add_guard(Some("Guard One"), "guard1@example.com");
    let now = Utc::now();
    store.add_ticket(
        100,
        Attendee {
            id: 1,
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.com".to_string(),
            document_id: "D-1906".to_string(),
            phone: None,
            created_at: now,
            updated_at: now,
        },
        TicketType {
            id: 1,
            name: "General".to_string(),
            event_name: "RustConf".to_string(),
            created_at: now,
        },
    );

    let codec = RedemptionCodec::new(KEY);
    let code = TicketIssuer::new(store.clone(), codec)
        .issue_code(100)
        .await
        .unwrap();

    let state = AppState::new(store.clone(), &local_config()).unwrap();
    Fixture {
        app: create_routes(state),
        store,
        guard_id: guard.id,
        code,
    }
}

fn scan_request(code: &str, guard_id: Uuid) -> Request<Body> {
    let body = serde_json::json!({ "redemptionCode": code, "guardId": guard_id }).to_string();
    Request::builder()
        .method("POST")
        .uri("/api/validations/scan")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn scan_records_and_reports_first_validation() {
    let f = fixture().await;

    let response = f
        .app
        .clone()
        .oneshot(scan_request(&f.code, f.guard_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let data = &json["data"];
    assert_eq!(data["isFirstValidation"], true);
    assert_eq!(data["ticketId"], 100);
    assert_eq!(data["attendee"]["firstName"], "Grace");
    assert_eq!(data["currentValidation"]["localServerId"], "gate-A");
    assert_eq!(data["ticketDetails"]["ticketType"]["eventName"], "RustConf");

    // Second scan of the same code is recorded but flagged
    let response = f
        .app
        .oneshot(scan_request(&f.code, f.guard_id))
        .await
        .unwrap();
    let json = response_json(response).await;
    assert_eq!(json["data"]["isFirstValidation"], false);
    assert_eq!(f.store.validation_count(), 2);
}

#[tokio::test]
async fn scan_rejects_forged_codes_without_recording() {
    let f = fixture().await;

    let response = f
        .app
        .oneshot(scan_request("deadbeef", f.guard_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "DECODE_ERROR");
    assert_eq!(f.store.validation_count(), 0);
}

#[tokio::test]
async fn scan_is_forbidden_on_the_global_server() {
    let store = Arc::new(MemoryStore::new());
    let guard = store.add_guard(Some("Guard One"), "guard1@example.com");
    let config = Config {
        server_mode: ServerMode::Global,
        ..local_config()
    };
    let app = create_routes(AppState::new(store, &config).unwrap());

    let response = app
        .oneshot(scan_request("irrelevant", guard.id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn scan_with_unknown_guard_is_not_found() {
    let f = fixture().await;

    let response = f
        .app
        .oneshot(scan_request(&f.code, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(f.store.validation_count(), 0);
}

#[tokio::test]
async fn history_lists_events_newest_first() {
    let f = fixture().await;
    for _ in 0..2 {
        f.app
            .clone()
            .oneshot(scan_request(&f.code, f.guard_id))
            .await
            .unwrap();
    }

    let response = f
        .app
        .oneshot(get("/api/validations/history/100"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let events = json["data"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["guardName"], "Guard One");
}

#[tokio::test]
async fn listing_supports_search_and_pagination() {
    let f = fixture().await;
    f.app
        .clone()
        .oneshot(scan_request(&f.code, f.guard_id))
        .await
        .unwrap();

    let response = f
        .app
        .clone()
        .oneshot(get("/api/validations?limit=10&search=hopper"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["data"]["total"], 1);

    let response = f
        .app
        .clone()
        .oneshot(get("/api/validations?limit=10&search=nobody"))
        .await
        .unwrap();
    let json = response_json(response).await;
    assert_eq!(json["data"]["total"], 0);

    // Out-of-range limit is a validation error
    let response = f.app.oneshot(get("/api/validations?limit=0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_aggregate_the_recorded_events() {
    let f = fixture().await;
    for _ in 0..2 {
        f.app
            .clone()
            .oneshot(scan_request(&f.code, f.guard_id))
            .await
            .unwrap();
    }

    let response = f.app.oneshot(get("/api/validations/stats")).await.unwrap();
    let json = response_json(response).await;
    assert_eq!(json["data"]["totalValidations"], 2);
    assert_eq!(json["data"]["uniqueTicketsValidated"], 1);
    assert_eq!(json["data"]["validationsToday"], 2);
}
