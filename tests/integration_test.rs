//! Integration tests for the boardd event server.
//! Spins up a real server on a free port and drives it over WebSocket.

use boardd::{
    board::store::TaskStore,
    board::{Category, Priority, Status, TaskDraft},
    client::BoardClient,
    config::{BoardConfig, HotConfig},
    ipc::event::EventBroadcaster,
    protocol::{ClientEvent, MovePayload, ServerEvent, TaskRef},
    storage::Storage,
    uploads::LocalAttachmentStore,
    AppContext,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

/// Start a server on a random port and return the WebSocket URL.
async fn start_test_server() -> (String, Arc<AppContext>) {
    start_test_server_with_toml(None).await
}

async fn start_test_server_with_toml(config_toml: Option<&str>) -> (String, Arc<AppContext>) {
    let data_dir = tempfile::tempdir().unwrap().keep();
    if let Some(toml) = config_toml {
        std::fs::write(data_dir.join("config.toml"), toml).unwrap();
    }
    let port = get_free_port();

    let config = Arc::new(BoardConfig::new(
        Some(port),
        Some(data_dir.clone()),
        Some("warn".to_string()),
        None,
    ));
    let storage = Arc::new(Storage::new(&data_dir).await.unwrap());
    let hot = HotConfig::from_config(&config);
    let ctx = Arc::new(AppContext {
        config: config.clone(),
        tasks: Arc::new(TaskStore::new(storage)),
        broadcaster: Arc::new(EventBroadcaster::new()),
        attachments: Arc::new(LocalAttachmentStore::new(&data_dir)),
        hot: Arc::new(tokio::sync::RwLock::new(hot)),
        started_at: std::time::Instant::now(),
    });

    let ctx_server = ctx.clone();
    tokio::spawn(async move {
        boardd::ipc::run(ctx_server).await.ok();
    });

    // Give the server a moment to bind
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let url = format!("ws://127.0.0.1:{}", ctx.config.port);
    (url, ctx)
}

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn synced_client(url: &str) -> BoardClient {
    let mut client = BoardClient::connect(url).await.expect("ws connect failed");
    client.wait_synced().await.expect("never received snapshot");
    client
}

/// Assert that no broadcast lands on `rx` within 300ms.
async fn assert_no_broadcast(rx: &mut tokio::sync::broadcast::Receiver<String>) {
    let quiet = tokio::time::timeout(std::time::Duration::from_millis(300), rx.recv()).await;
    assert!(quiet.is_err(), "unexpected broadcast: {quiet:?}");
}

#[tokio::test]
async fn load_returns_empty_snapshot_for_a_fresh_board() {
    let (url, _ctx) = start_test_server().await;
    let client = synced_client(&url).await;
    assert!(client.projection().tasks().is_empty());
}

#[tokio::test]
async fn create_broadcasts_to_all_clients_including_originator() {
    let (url, _ctx) = start_test_server().await;
    let mut alice = synced_client(&url).await;
    let mut bob = synced_client(&url).await;

    let mut draft = TaskDraft::new("Write spec");
    draft.priority = Priority::High;
    alice.send(&ClientEvent::Create(draft)).await.unwrap();

    let to_alice = alice.next_event().await.unwrap().unwrap();
    let to_bob = bob.next_event().await.unwrap().unwrap();

    let (ServerEvent::Created(a), ServerEvent::Created(b)) = (to_alice, to_bob) else {
        panic!("expected task:created on both connections");
    };
    assert_eq!(a, b);
    assert!(!a.id.is_empty());
    assert_eq!(a.title, "Write spec");
    assert_eq!(a.priority, Priority::High);
    assert_eq!(a.category, Category::Feature);
    assert_eq!(a.status, Status::Todo);
    assert_eq!(a.file_url, "");
}

#[tokio::test]
async fn created_task_appears_exactly_once_in_the_next_snapshot() {
    let (url, _ctx) = start_test_server().await;
    let mut alice = synced_client(&url).await;
    let mut draft = TaskDraft::new("Round trip");
    draft.category = Category::Bug;
    alice.send(&ClientEvent::Create(draft)).await.unwrap();
    let Some(ServerEvent::Created(created)) = alice.next_event().await.unwrap() else {
        panic!("expected task:created");
    };

    // A late joiner requests its own snapshot.
    let late = synced_client(&url).await;
    let matches: Vec<_> = late
        .projection()
        .tasks()
        .into_iter()
        .filter(|t| t.id == created.id)
        .collect();
    assert_eq!(matches.len(), 1);
    assert_eq!(*matches[0], created);
}

#[tokio::test]
async fn move_changes_only_status() {
    let (url, ctx) = start_test_server().await;
    let created = ctx
        .tasks
        .create(TaskDraft::new("Drag me"))
        .await
        .unwrap();

    let mut client = synced_client(&url).await;
    client
        .send(&ClientEvent::Move(MovePayload {
            task_id: created.id.clone(),
            new_status: Status::Done,
        }))
        .await
        .unwrap();

    let Some(ServerEvent::Moved(moved)) = client.next_event().await.unwrap() else {
        panic!("expected task:moved");
    };
    assert_eq!(moved.status, Status::Done);
    assert_eq!(moved.id, created.id);
    assert_eq!(moved.title, created.title);
    assert_eq!(moved.priority, created.priority);
    assert_eq!(moved.category, created.category);
    assert_eq!(moved.file_url, created.file_url);
    assert_eq!(moved.created_at, created.created_at);
}

#[tokio::test]
async fn update_merges_fields_and_keeps_id_and_created_at() {
    let (url, ctx) = start_test_server().await;
    let created = ctx.tasks.create(TaskDraft::new("Old title")).await.unwrap();

    let mut client = synced_client(&url).await;
    let mut edited = created.clone();
    edited.title = "New title".to_string();
    edited.priority = Priority::Low;
    client.send(&ClientEvent::Update(edited)).await.unwrap();

    let Some(ServerEvent::Updated(updated)) = client.next_event().await.unwrap() else {
        panic!("expected task:updated");
    };
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(updated.title, "New title");
    assert_eq!(updated.priority, Priority::Low);
}

#[tokio::test]
async fn delete_of_missing_id_produces_no_broadcast_and_leaves_count() {
    let (url, ctx) = start_test_server().await;
    ctx.tasks.create(TaskDraft::new("Survivor")).await.unwrap();

    let mut rx = ctx.broadcaster.subscribe();
    let mut client = synced_client(&url).await;
    client
        .send(&ClientEvent::Delete(TaskRef {
            task_id: "no-such-id".into(),
        }))
        .await
        .unwrap();

    assert_no_broadcast(&mut rx).await;
    assert_eq!(ctx.tasks.count().await.unwrap(), 1);
}

#[tokio::test]
async fn empty_title_create_is_rejected_server_side() {
    let (url, ctx) = start_test_server().await;
    let mut rx = ctx.broadcaster.subscribe();
    let mut client = synced_client(&url).await;
    client
        .send(&ClientEvent::Create(TaskDraft::new("   ")))
        .await
        .unwrap();

    assert_no_broadcast(&mut rx).await;
    assert_eq!(ctx.tasks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn confirmed_delete_removes_the_task_for_every_client() {
    let (url, ctx) = start_test_server().await;
    let created = ctx.tasks.create(TaskDraft::new("Doomed")).await.unwrap();

    let mut alice = synced_client(&url).await;
    let mut bob = synced_client(&url).await;
    alice.delete_task(&created.id).await.unwrap();
    // Optimistic removal is visible before any confirmation.
    assert!(alice.projection().tasks().is_empty());

    let Some(ServerEvent::Deleted(gone)) = bob.next_event().await.unwrap() else {
        panic!("expected task:deleted");
    };
    assert_eq!(gone.task_id, created.id);
    assert!(bob.projection().tasks().is_empty());

    alice.next_event().await.unwrap();
    assert!(alice.projection().tasks().is_empty());
    assert_eq!(ctx.tasks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn optimistic_delete_race_does_not_resurrect() {
    let (url, ctx) = start_test_server().await;
    let created = ctx.tasks.create(TaskDraft::new("Contested")).await.unwrap();

    let mut client = synced_client(&url).await;
    // Another client wins the race before our intent lands.
    assert!(ctx.tasks.delete(&created.id).await.unwrap());

    let mut rx = ctx.broadcaster.subscribe();
    client.delete_task(&created.id).await.unwrap();
    assert!(client.projection().tasks().is_empty());

    // No broadcast arrives, and the projection stays without the task.
    assert_no_broadcast(&mut rx).await;
    assert!(client.projection().tasks().is_empty());
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_connection() {
    let (url, _ctx) = start_test_server().await;

    // An unknown event name is logged and dropped server-side...
    use futures_util::SinkExt as _;
    use tokio_tungstenite::{connect_async, tungstenite::Message};
    let (mut raw, _) = connect_async(&url).await.unwrap();
    raw.send(Message::Text(r#"{"event":"task:destroy"}"#.into()))
        .await
        .unwrap();
    raw.send(Message::Text("not json at all".into())).await.unwrap();
    // ...and the same connection still gets its snapshot afterwards.
    raw.send(Message::Text(ClientEvent::Load.encode())).await.unwrap();
    use futures_util::StreamExt as _;
    let reply = tokio::time::timeout(std::time::Duration::from_secs(5), raw.next())
        .await
        .expect("no reply after malformed frames")
        .unwrap()
        .unwrap();
    let Message::Text(text) = reply else {
        panic!("expected a text frame");
    };
    assert!(matches!(
        ServerEvent::decode(&text).unwrap(),
        ServerEvent::Initial(_)
    ));
}

#[tokio::test]
async fn health_endpoint_reports_status_and_task_count() {
    let (_url, ctx) = start_test_server().await;
    ctx.tasks.create(TaskDraft::new("Counted")).await.unwrap();

    let mut stream =
        tokio::net::TcpStream::connect(("127.0.0.1", ctx.config.port)).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["tasks"], 1);
}

#[tokio::test]
async fn upload_stores_within_ceiling_and_rejects_above_it() {
    let (_url, ctx) = start_test_server_with_toml(Some("max_upload_bytes = 1024\n")).await;
    let base = format!("http://127.0.0.1:{}", ctx.config.port);

    let ok = reqwest::Client::new()
        .post(format!("{base}/upload"))
        .header("X-File-Name", "notes.txt")
        .body(vec![b'x'; 100])
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 201);
    let body: serde_json::Value = ok.json().await.unwrap();
    let file_url = body["fileUrl"].as_str().unwrap();
    assert!(file_url.starts_with("/uploads/"));
    let on_disk = ctx
        .config
        .data_dir
        .join("uploads")
        .join(file_url.trim_start_matches("/uploads/"));
    assert_eq!(std::fs::read(on_disk).unwrap().len(), 100);

    let too_big = reqwest::Client::new()
        .post(format!("{base}/upload"))
        .header("X-File-Name", "huge.bin")
        .body(vec![b'x'; 2048])
        .send()
        .await
        .unwrap();
    assert_eq!(too_big.status().as_u16(), 413);
}
