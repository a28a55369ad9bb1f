//! Realtime endpoint.
//!
//! `GET /ws?roomID=<room>&clientID=<client>` upgrades to a WebSocket that joins `room`.
//! Outbound frames go through a [`ChannelSink`] drained by a writer task; inbound text
//! frames are fed to the session loop until the peer goes away.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::debug;

use stockflow_events::{
    ChannelSink, ClientId, ConnectionError, FrameSource, Outbound, RoomId, RoomRegistry, serve_connection,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "roomID", default)]
    pub room_id: String,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
}

pub async fn connect(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ConnectQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (room_id, client_id) = match (RoomId::parse(query.room_id), ClientId::parse(query.client_id)) {
        (Ok(room), Ok(client)) => (room, client),
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_connect",
                "roomID and clientID are required",
            );
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let registry = services.registry.clone();
    ws.on_upgrade(move |socket| socket_session(socket, registry, room_id, client_id))
}

/// Current member count of every live room.
pub async fn room_occupancy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    let occupancy = services.registry.occupancy().await;
    debug!(subject = principal.subject(), rooms = occupancy.len(), "room occupancy requested");
    dto::data(StatusCode::OK, occupancy)
}

async fn socket_session(socket: WebSocket, registry: Arc<RoomRegistry>, room_id: RoomId, client_id: ClientId) {
    let (ws_tx, ws_rx) = socket.split();
    let (sink, outbound) = ChannelSink::new();

    let writer = tokio::spawn(write_outbound(ws_tx, outbound));

    let state = serve_connection(
        registry,
        room_id,
        client_id,
        Arc::new(sink),
        SocketFrameSource { inner: ws_rx },
    )
    .await;
    debug!(?state, "session finished");

    // The session closed its sink, so the writer ends after flushing.
    if let Err(e) = writer.await {
        debug!("socket writer task failed: {e}");
    }
}

async fn write_outbound(mut ws_tx: SplitSink<WebSocket, Message>, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.tick().await;

    loop {
        tokio::select! {
            item = outbound.recv() => match item {
                Some(Outbound::Frame(frame)) => {
                    if ws_tx.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Text frames from the socket; control and binary frames are skipped.
struct SocketFrameSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for SocketFrameSource {
    async fn next_frame(&mut self) -> Result<Option<String>, ConnectionError> {
        while let Some(msg) = self.inner.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => continue,
                Err(e) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
        Ok(None)
    }
}
