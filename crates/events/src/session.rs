//! Per-connection reader loop.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionSink, Frame, FrameSource};
use crate::ident::{ClientId, RoomId};
use crate::message::{Action, RoomMessage};
use crate::registry::{Audience, Member, RoomRegistry};

/// Connection lifecycle.
///
/// `Connecting -> Joined -> Active -> Leaving -> Closed`; `Active` loops on itself
/// for every handled frame and `Closed` is terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Joined,
    Active,
    Leaving,
    Closed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid connection transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    pub fn transition(self, to: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;

        let allowed = matches!(
            (self, to),
            (Connecting, Joined)
                | (Connecting, Closed)
                | (Joined, Active)
                | (Joined, Leaving)
                | (Active, Active)
                | (Active, Leaving)
                | (Leaving, Closed)
        );

        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

/// One live connection: its identity, transport, and current room.
pub struct Session {
    registry: Arc<RoomRegistry>,
    member: Member,
    room: Option<RoomId>,
    state: ConnectionState,
}

impl Session {
    pub fn new(registry: Arc<RoomRegistry>, client_id: ClientId, sink: Arc<dyn ConnectionSink>) -> Self {
        Self {
            registry,
            member: Member::new(client_id, sink),
            room: None,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn client_id(&self) -> &ClientId {
        self.member.client_id()
    }

    fn advance(&mut self, to: ConnectionState) {
        match self.state.transition(to) {
            Ok(next) => self.state = next,
            Err(e) => warn!(client_id = %self.member.client_id(), "{e}"),
        }
    }

    /// Enter the initial room.
    pub async fn open(&mut self, room_id: RoomId) -> usize {
        let count = self.registry.join(&room_id, self.member.clone()).await;
        self.room = Some(room_id);
        self.advance(ConnectionState::Joined);
        count
    }

    /// Handle one inbound text frame.
    ///
    /// The frame's `clientID` is ignored: identity comes from the connection.
    pub async fn handle_frame(&mut self, frame: &str) {
        self.advance(ConnectionState::Active);

        let message = match RoomMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!(client_id = %self.member.client_id(), "dropping inbound frame: {e}");
                self.reply_error(e.to_string()).await;
                return;
            }
        };

        match message.action {
            Action::Join => match RoomId::parse(message.room_id) {
                Ok(target) => self.move_to(target).await,
                Err(e) => self.reply_error(e.to_string()).await,
            },
            Action::Leave => self.leave_current().await,
            Action::Update => self.rebroadcast(message).await,
            Action::Error => {
                debug!(client_id = %self.member.client_id(), "ignoring client error frame");
            }
        }
    }

    async fn move_to(&mut self, target: RoomId) {
        if self.room.as_ref() == Some(&target) {
            return;
        }
        self.leave_current().await;
        self.registry.join(&target, self.member.clone()).await;
        self.room = Some(target);
    }

    async fn leave_current(&mut self) {
        if let Some(room_id) = self.room.take() {
            self.registry.leave(&room_id, self.member.connection_id()).await;
        }
    }

    async fn rebroadcast(&mut self, message: RoomMessage) {
        let Some(room_id) = self.room.clone() else {
            self.reply_error("not in a room").await;
            return;
        };
        let client_id = self.member.client_id().clone();
        let update = RoomMessage::new(Action::Update, &room_id, &client_id, message.data);
        if let Err(e) = self.registry.publish(&update, Audience::Others(client_id)).await {
            warn!(room_id = %room_id, "rebroadcast failed: {e}");
        }
    }

    async fn reply_error(&self, reason: impl Into<String>) {
        let reply = RoomMessage::error(self.room.as_ref(), self.member.client_id(), reason);
        match reply.encode() {
            Ok(text) => {
                if let Err(e) = self.member.sink().send(Frame::from(text)).await {
                    debug!(client_id = %self.member.client_id(), "error reply not sent: {e}");
                }
            }
            Err(e) => warn!("error reply not encoded: {e}"),
        }
    }

    /// Leave whatever room the connection is in and close the transport.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.state != ConnectionState::Connecting {
            self.advance(ConnectionState::Leaving);
        }
        self.leave_current().await;
        if let Err(e) = self.member.sink().close().await {
            debug!(client_id = %self.member.client_id(), "transport close failed: {e}");
        }
        self.advance(ConnectionState::Closed);
    }
}

/// Drive a connection from join to close.
///
/// Reads frames until the peer goes away or the transport errors, then always leaves
/// the room and closes the sink. Returns the final state.
pub async fn serve_connection<S>(
    registry: Arc<RoomRegistry>,
    room_id: RoomId,
    client_id: ClientId,
    sink: Arc<dyn ConnectionSink>,
    mut source: S,
) -> ConnectionState
where
    S: FrameSource,
{
    let mut session = Session::new(registry, client_id, sink);
    info!(room_id = %room_id, client_id = %session.client_id(), "connection opened");
    session.open(room_id).await;

    loop {
        match source.next_frame().await {
            Ok(Some(frame)) => session.handle_frame(&frame).await,
            Ok(None) => break,
            Err(e) => {
                debug!(client_id = %session.client_id(), "read failed: {e}");
                break;
            }
        }
    }

    session.close().await;
    info!(client_id = %session.client_id(), "connection closed");
    session.state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, ScriptedSource};

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    fn client(id: &str) -> ClientId {
        ClientId::parse(id).unwrap()
    }

    async fn observer(registry: &RoomRegistry, room_id: &str) -> Arc<RecordingSink> {
        let sink = Arc::new(RecordingSink::default());
        registry
            .join(&room(room_id), Member::new(client("observer"), sink.clone()))
            .await;
        sink
    }

    #[test]
    fn closed_is_terminal() {
        for next in [
            ConnectionState::Connecting,
            ConnectionState::Joined,
            ConnectionState::Active,
            ConnectionState::Leaving,
            ConnectionState::Closed,
        ] {
            assert!(ConnectionState::Closed.transition(next).is_err());
        }
        assert!(ConnectionState::Joined.transition(ConnectionState::Connecting).is_err());
        assert_eq!(
            ConnectionState::Active.transition(ConnectionState::Active),
            Ok(ConnectionState::Active)
        );
    }

    #[tokio::test]
    async fn peer_hangup_leaves_room_and_closes_transport() {
        let registry = Arc::new(RoomRegistry::new());
        let watcher = observer(&registry, "R").await;
        let sink = Arc::new(RecordingSink::default());

        let state = serve_connection(
            registry.clone(),
            room("R"),
            client("a"),
            sink.clone(),
            ScriptedSource::default(),
        )
        .await;

        assert_eq!(state, ConnectionState::Closed);
        assert!(sink.is_closed());
        assert_eq!(registry.member_count("R").await, 1);
        let actions: Vec<Action> = watcher.messages().iter().map(|m| m.action).collect();
        assert_eq!(actions, vec![Action::Join, Action::Leave]);
    }

    #[tokio::test]
    async fn read_error_still_leaves_room() {
        let registry = Arc::new(RoomRegistry::new());
        let sink = Arc::new(RecordingSink::default());

        let state = serve_connection(
            registry.clone(),
            room("R"),
            client("a"),
            sink.clone(),
            ScriptedSource::default().then_fail(),
        )
        .await;

        assert_eq!(state, ConnectionState::Closed);
        assert!(!registry.contains_room("R"));
    }

    #[tokio::test]
    async fn scripted_frames_are_handled_in_order_until_hangup() {
        let registry = Arc::new(RoomRegistry::new());
        let watcher = observer(&registry, "R").await;
        let sink = Arc::new(RecordingSink::default());

        let state = serve_connection(
            registry.clone(),
            room("R"),
            client("a"),
            sink.clone(),
            ScriptedSource::new([r#"{"action":"update","roomID":"R","data":{"qty":5}}"#, "{not json"]),
        )
        .await;

        assert_eq!(state, ConnectionState::Closed);
        assert!(sink.is_closed());

        let seen = watcher.messages();
        let actions: Vec<Action> = seen.iter().map(|m| m.action).collect();
        assert_eq!(actions, vec![Action::Join, Action::Update, Action::Leave]);
        assert_eq!(seen[1].client_id, "a");
        assert_eq!(seen[1].data, serde_json::json!({"qty": 5}));

        let errors = sink
            .messages()
            .into_iter()
            .filter(|m| m.action == Action::Error)
            .count();
        assert_eq!(errors, 1);
        assert_eq!(registry.member_count("R").await, 1);
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_reply_only_to_sender() {
        let registry = Arc::new(RoomRegistry::new());
        let watcher = observer(&registry, "R").await;
        let sink = Arc::new(RecordingSink::default());

        let mut session = Session::new(registry.clone(), client("a"), sink.clone());
        session.open(room("R")).await;
        watcher.clear();

        session.handle_frame("{not json").await;

        let replies = sink.messages();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].action, Action::Error);
        assert_eq!(replies[0].room_id, "R");
        assert!(watcher.messages().is_empty());
        assert_eq!(session.state(), ConnectionState::Active);
        assert_eq!(registry.member_count("R").await, 2);
    }

    #[tokio::test]
    async fn inbound_update_is_rebroadcast_under_connection_identity() {
        let registry = Arc::new(RoomRegistry::new());
        let watcher = observer(&registry, "R").await;
        let sink = Arc::new(RecordingSink::default());

        let mut session = Session::new(registry.clone(), client("a"), sink.clone());
        session.open(room("R")).await;
        watcher.clear();

        session
            .handle_frame(r#"{"action":"update","roomID":"elsewhere","clientID":"spoofed","data":{"id":3}}"#)
            .await;

        let seen = watcher.messages();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].action, Action::Update);
        assert_eq!(seen[0].room_id, "R");
        assert_eq!(seen[0].client_id, "a");
        assert_eq!(seen[0].data, serde_json::json!({"id": 3}));
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn inbound_join_moves_between_rooms() {
        let registry = Arc::new(RoomRegistry::new());
        let sink = Arc::new(RecordingSink::default());

        let mut session = Session::new(registry.clone(), client("a"), sink);
        session.open(room("warehouse")).await;
        session
            .handle_frame(r#"{"action":"join","roomID":"product","clientID":"a"}"#)
            .await;

        assert_eq!(session.room(), Some(&room("product")));
        assert!(!registry.contains_room("warehouse"));
        assert_eq!(registry.member_count("product").await, 1);
    }

    #[tokio::test]
    async fn inbound_leave_keeps_connection_open() {
        let registry = Arc::new(RoomRegistry::new());
        let sink = Arc::new(RecordingSink::default());

        let mut session = Session::new(registry.clone(), client("a"), sink.clone());
        session.open(room("R")).await;
        session.handle_frame(r#"{"action":"leave","roomID":"R"}"#).await;

        assert_eq!(session.room(), None);
        assert!(!registry.contains_room("R"));
        assert!(!sink.is_closed());

        session.handle_frame(r#"{"action":"update","data":1}"#).await;
        assert_eq!(sink.messages()[0].action, Action::Error);

        session.close().await;
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(sink.is_closed());
    }
}
