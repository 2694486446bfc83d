//! Lightweight WebSocket board client.
//!
//! CLI subcommands (`boardd snapshot`, `boardd create`) and the integration
//! tests use this to connect to a running server, send intents, and keep a
//! local [`BoardProjection`] in step with the broadcast stream.

use anyhow::{Context as _, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::protocol::{ClientEvent, ServerEvent, TaskRef};
use crate::sync::BoardProjection;

const EVENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const RECONNECT_BASE_DELAY: std::time::Duration = std::time::Duration::from_millis(100);
const RECONNECT_MAX_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct BoardClient {
    url: String,
    ws: Socket,
    projection: BoardProjection,
}

impl BoardClient {
    /// Connect and immediately request the snapshot. The projection starts
    /// unsynced; call [`BoardClient::wait_synced`] to pump until
    /// `tasks:initial` arrives.
    pub async fn connect(url: &str) -> Result<Self> {
        let ws = Self::open(url).await?;
        let mut client = Self {
            url: url.to_string(),
            ws,
            projection: BoardProjection::new(),
        };
        client.send(&ClientEvent::Load).await?;
        Ok(client)
    }

    async fn open(url: &str) -> Result<Socket> {
        let (ws, _) = tokio::time::timeout(EVENT_TIMEOUT, connect_async(url))
            .await
            .context("timed out connecting to board server")?
            .context("failed to connect to board server WebSocket")?;
        Ok(ws)
    }

    /// Drop the old socket, reconnect with capped exponential backoff, reset
    /// the projection to unsynced, and re-request the snapshot.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.projection.reset();
        let mut delay = RECONNECT_BASE_DELAY;
        loop {
            match Self::open(&self.url).await {
                Ok(ws) => {
                    self.ws = ws;
                    self.send(&ClientEvent::Load).await?;
                    return Ok(());
                }
                Err(e) => {
                    warn!(err = %e, delay_ms = delay.as_millis() as u64, "reconnect failed — retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                }
            }
        }
    }

    pub async fn send(&mut self, intent: &ClientEvent) -> Result<()> {
        self.ws.send(Message::Text(intent.encode())).await?;
        Ok(())
    }

    /// Optimistic local delete: hide the record immediately, then send the
    /// intent. The record is dropped for real only when the confirming
    /// broadcast arrives (or the next snapshot corrects the view).
    pub async fn delete_task(&mut self, id: &str) -> Result<()> {
        self.projection.mark_pending_delete(id);
        self.send(&ClientEvent::Delete(TaskRef {
            task_id: id.to_string(),
        }))
        .await
    }

    /// Read the next server event (with timeout) and apply it to the
    /// projection. Returns `None` when the connection closed.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        loop {
            let msg = tokio::time::timeout(EVENT_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a server event")?;
            match msg {
                Some(Ok(Message::Text(text))) => match ServerEvent::decode(&text) {
                    Ok(event) => {
                        self.projection.apply(&event);
                        return Ok(Some(event));
                    }
                    Err(e) => {
                        debug!(err = %e, "skipping undecodable frame");
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Pump events until the snapshot has been applied.
    pub async fn wait_synced(&mut self) -> Result<()> {
        while !self.projection.is_synced() {
            if self.next_event().await?.is_none() {
                anyhow::bail!("connection closed before tasks:initial");
            }
        }
        Ok(())
    }

    pub fn projection(&self) -> &BoardProjection {
        &self.projection
    }
}
