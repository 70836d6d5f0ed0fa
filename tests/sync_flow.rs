use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gatepass_server::config::{Config, ServerMode};
use gatepass_server::models::{Attendee, TicketType};
use gatepass_server::routes::{create_routes, AppState};
use gatepass_server::services::{RedemptionCodec, SyncCoordinator, TicketIssuer, ValidationRecorder};
use gatepass_server::stores::MemoryStore;

const KEY: [u8; 32] = *b"an-example-32-byte-signing-key!!";
const API_KEY: &str = "shared-sync-key";

fn config(mode: ServerMode, global_url: Option<String>) -> Config {
    Config {
        database_url: String::new(),
        port: 0,
        server_mode: mode,
        redemption_secret: KEY,
        global_server_url: global_url,
        sync_api_key: Some(API_KEY.to_string()),
        sync_timeout: Duration::from_secs(5),
    }
}

/// Serve a global-mode deployment on a loopback port. Returns its base URL,
/// its store, and the task handle so the server can be stopped.
async fn spawn_global_server() -> (String, Arc<MemoryStore>, tokio::task::JoinHandle<()>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), &config(ServerMode::Global, None)).unwrap();
    let app = create_routes(state);

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), store, handle)
}

fn seed_ticket(store: &MemoryStore, ticket_id: i64) {
    let now = Utc::now();
    store.add_ticket(
        ticket_id,
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
}

/// Full local→global round trip: scan at the gate, push, verify the global
/// store, then confirm a second push has nothing to do.
#[tokio::test]
async fn local_scan_syncs_to_global_exactly_once() {
    let (global_url, global_store, server) = spawn_global_server().await;
    // Guard accounts exist on both deployments, matched by email at ingest
    global_store.add_guard(Some("Guard One"), "guard1@example.com");

    let local_store = Arc::new(MemoryStore::new());
    let guard = local_store.add_guard(Some("Guard One"), "guard1@example.com");
    seed_ticket(&local_store, 100);

    let mode = ServerMode::Local {
        server_id: Some("gate-A".to_string()),
    };
    let codec = RedemptionCodec::new(KEY);
    let recorder = ValidationRecorder::new(local_store.clone(), mode.clone());
    let issuer = TicketIssuer::new(local_store.clone(), codec.clone());
    let sync = SyncCoordinator::new(
        local_store.clone(),
        mode,
        Some(global_url),
        Some(API_KEY.to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    // Guard scans ticket 100 at the gate
    let code = issuer.issue_code(100).await.unwrap();
    let outcome = recorder.scan(&codec, &code, guard.id).await.unwrap();
    assert!(outcome.is_first_validation);
    assert!(outcome.current_validation.synced_at.is_none());
    assert_eq!(
        outcome.current_validation.local_server_id.as_deref(),
        Some("gate-A")
    );

    let pending = sync.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].ticket_id, 100);

    // Push to the global server
    let result = sync.push().await.unwrap();
    assert_eq!(result.synced, 1);

    // Local event is now marked synced
    let events = local_store.events();
    assert!(events[0].synced_at.is_some());
    let status = sync.status().await.unwrap();
    assert_eq!(status.unsynced_count, 0);
    assert!(status.last_synced_at.is_some());

    // Global store holds the event with its origin server and synced_at set
    let global_events = global_store.events();
    assert_eq!(global_events.len(), 1);
    assert_eq!(global_events[0].ticket_id, 100);
    assert_eq!(global_events[0].local_server_id.as_deref(), Some("gate-A"));
    assert!(global_events[0].synced_at.is_some());

    // With nothing pending, a second push makes no network request at all:
    // it still succeeds after the global server is gone.
    server.abort();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = sync.push().await.unwrap();
    assert_eq!(second.synced, 0);
}

/// A push that overlaps a previous redelivery leaves one row on the global
/// side; the natural-key upsert is the only deduplication mechanism.
#[tokio::test]
async fn overlapping_pushes_do_not_duplicate_rows() {
    let (global_url, global_store, _server) = spawn_global_server().await;
    global_store.add_guard(Some("Guard One"), "guard1@example.com");

    let local_store = Arc::new(MemoryStore::new());
    let guard = local_store.add_guard(Some("Guard One"), "guard1@example.com");
    seed_ticket(&local_store, 100);

    let mode = ServerMode::Local {
        server_id: Some("gate-A".to_string()),
    };
    let recorder = ValidationRecorder::new(local_store.clone(), mode.clone());
    recorder.record(100, guard.id).await.unwrap();

    let sync = SyncCoordinator::new(
        local_store.clone(),
        mode,
        Some(global_url),
        Some(API_KEY.to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    sync.push().await.unwrap();

    // Simulate redelivery: forget the synced flag locally and push again
    let ids: Vec<i64> = local_store.events().iter().map(|e| e.id).collect();
    local_store.reset_synced(&ids);
    let second = sync.push().await.unwrap();
    assert_eq!(second.synced, 1);

    assert_eq!(global_store.validation_count(), 1);
}
