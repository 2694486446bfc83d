pub mod event;

use crate::board::TaskPatch;
use crate::protocol::{ClientEvent, ServerEvent, TaskRef};
use crate::uploads::{AttachmentStore as _, UploadError};
use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "board server listening (WebSocket + HTTP health/upload on same port)");

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping board server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("board server stopped");
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish the plain-HTTP endpoints from
    // WebSocket upgrades. All share the same port: "GET /health" and
    // "POST /upload" are answered as HTTP; every other request falls through
    // to the WS handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }
    if n >= 12 && &peek_buf[..12] == b"POST /upload" {
        return handle_upload(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // Register with the broadcast coordinator before handling any intent so
    // this connection cannot miss a broadcast for its own first mutation.
    let mut broadcast_rx = ctx.broadcaster.subscribe();

    loop {
        tokio::select! {
            // Incoming intent from this client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_frame(&text, &ctx).await {
                            if let Err(e) = sink.send(Message::Text(reply)).await {
                                warn!(err = %e, "send error");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing broadcast event from any connection's mutation
            event = broadcast_rx.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "broadcast send error");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }
    Ok(())
}

// ─── Intent dispatch ─────────────────────────────────────────────────────────

/// Bind one inbound frame to its task store call.
///
/// Returns the direct reply to send to the requesting connection, if any
/// (`task:load` is the only intent answered directly — everything else is
/// published through the broadcaster on success). Failures are logged and
/// dropped: no broadcast, no error frame back to the requester.
pub(crate) async fn handle_frame(text: &str, ctx: &AppContext) -> Option<String> {
    let intent = match ClientEvent::decode(text) {
        Ok(intent) => intent,
        Err(e) => {
            warn!(err = %e, "dropping malformed event frame");
            return None;
        }
    };

    match intent {
        ClientEvent::Load => match ctx.tasks.list().await {
            Ok(tasks) => Some(ServerEvent::Initial(tasks).encode()),
            Err(e) => {
                warn!(err = %e, "snapshot failed");
                None
            }
        },
        ClientEvent::Create(draft) => {
            match ctx.tasks.create(draft).await {
                Ok(task) => ctx.broadcaster.broadcast(&ServerEvent::Created(task)),
                Err(e) => warn!(err = %e, "create failed"),
            }
            None
        }
        ClientEvent::Move(mv) => {
            match ctx.tasks.move_task(&mv.task_id, mv.new_status).await {
                Ok(Some(task)) => ctx.broadcaster.broadcast(&ServerEvent::Moved(task)),
                Ok(None) => debug!(id = %mv.task_id, "move target not found — no broadcast"),
                Err(e) => warn!(err = %e, id = %mv.task_id, "move failed"),
            }
            None
        }
        ClientEvent::Update(task) => {
            let patch = TaskPatch::from_task(&task);
            match ctx.tasks.update(&task.id, patch).await {
                Ok(Some(task)) => ctx.broadcaster.broadcast(&ServerEvent::Updated(task)),
                Ok(None) => debug!(id = %task.id, "update target not found — no broadcast"),
                Err(e) => warn!(err = %e, id = %task.id, "update failed"),
            }
            None
        }
        ClientEvent::Delete(task_ref) => {
            match ctx.tasks.delete(&task_ref.task_id).await {
                Ok(true) => ctx.broadcaster.broadcast(&ServerEvent::Deleted(TaskRef {
                    task_id: task_ref.task_id,
                })),
                Ok(false) => debug!(id = %task_ref.task_id, "delete target not found — no broadcast"),
                Err(e) => warn!(err = %e, id = %task_ref.task_id, "delete failed"),
            }
            None
        }
    }
}

// ─── Plain-HTTP endpoints (same port as the WebSocket) ───────────────────────

/// Respond to an HTTP `GET /health` request with a JSON status document,
/// so clients can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let tasks = ctx.tasks.count().await.unwrap_or(0);
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "tasks": tasks,
        "port": ctx.config.port,
    });
    write_http_response(&mut stream, "200 OK", &body.to_string()).await
}

/// Handle `POST /upload`: raw file bytes in the body, optional `X-File-Name`
/// header. The size ceiling is enforced from `Content-Length` *before* the
/// body is read. Upload failures are surfaced synchronously to this request
/// only — never broadcast, never retried.
async fn handle_upload(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(8192);
    let mut tmp = [0u8; 4096];

    // Read up to the end of the headers.
    let header_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > 64 * 1024 {
            return write_http_response(
                &mut stream,
                "400 Bad Request",
                r#"{"error":"request headers too large"}"#,
            )
            .await;
        }
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = header_value(&head, "content-length").and_then(|v| v.parse::<u64>().ok());
    let file_name = header_value(&head, "x-file-name").unwrap_or_else(|| "attachment.bin".into());

    let Some(len) = content_length else {
        return write_http_response(
            &mut stream,
            "411 Length Required",
            r#"{"error":"Content-Length required"}"#,
        )
        .await;
    };

    // Ceiling check happens before a single body byte is read.
    let limit = ctx.hot.read().await.max_upload_bytes;
    if len > limit {
        let err = UploadError::TooLarge { size: len, limit };
        warn!(size = len, limit, "upload rejected");
        let body = serde_json::json!({ "error": err.to_string() }).to_string();
        return write_http_response(&mut stream, "413 Payload Too Large", &body).await;
    }

    let mut body = buf[header_end..].to_vec();
    while (body.len() as u64) < len {
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(len as usize);

    match ctx.attachments.store(&file_name, &body).await {
        Ok(file_url) => {
            info!(file = %file_name, url = %file_url, "attachment stored");
            let body = serde_json::json!({ "fileUrl": file_url }).to_string();
            write_http_response(&mut stream, "201 Created", &body).await
        }
        Err(e) => {
            warn!(err = %e, file = %file_name, "attachment storage failed");
            let body = serde_json::json!({ "error": e.to_string() }).to_string();
            write_http_response(&mut stream, "500 Internal Server Error", &body).await
        }
    }
}

async fn write_http_response(
    stream: &mut tokio::net::TcpStream,
    status: &str,
    body: &str,
) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Case-insensitive lookup of a header value in a raw HTTP request head.
fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}
