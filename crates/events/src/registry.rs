//! Room registry and broadcast fan-out.
//!
//! Locking: one `std::sync::Mutex` guards the room map (existence only, never held
//! across an await); every room guards its own member set with a `tokio::sync::Mutex`
//! that is held for the whole fan-out, so two events published into one room reach
//! every member in the same order. Unrelated rooms never contend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use stockflow_core::ConnectionId;

use crate::connection::{ConnectionSink, Frame};
use crate::ident::{ClientId, RoomId};
use crate::message::{Action, MessageError, RoomMessage};

/// One connection as seen by a room.
#[derive(Clone)]
pub struct Member {
    connection_id: ConnectionId,
    client_id: ClientId,
    sink: Arc<dyn ConnectionSink>,
}

impl Member {
    pub fn new(client_id: ClientId, sink: Arc<dyn ConnectionSink>) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            client_id,
            sink,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn sink(&self) -> &Arc<dyn ConnectionSink> {
        &self.sink
    }
}

impl core::fmt::Debug for Member {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Member")
            .field("connection_id", &self.connection_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Who receives a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every member except connections of this client.
    Others(ClientId),
    /// Every member, the originator included.
    Everyone,
}

impl Audience {
    fn includes(&self, member: &Member) -> bool {
        match self {
            Audience::Others(origin) => member.client_id != *origin,
            Audience::Everyone => true,
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Members {
    by_connection: HashMap<ConnectionId, Member>,
    /// Set once the room has been emptied and unlinked from the registry.
    retired: bool,
}

struct Room {
    members: tokio::sync::Mutex<Members>,
}

/// Rooms of live connections.
///
/// Constructed once by the process bootstrap and shared via `Arc`.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, room_id: &str) -> Option<Arc<Room>> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.get(room_id).cloned()
    }

    fn lookup_or_create(&self, room_id: &RoomId) -> Arc<Room> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                debug!(room_id = %room_id, "room created");
                Arc::new(Room {
                    members: tokio::sync::Mutex::new(Members::default()),
                })
            })
            .clone()
    }

    fn unlink(&self, room_id: &RoomId, room: &Arc<Room>) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if rooms.get(room_id).is_some_and(|current| Arc::ptr_eq(current, room)) {
            rooms.remove(room_id);
            debug!(room_id = %room_id, "room removed");
        }
    }

    /// Add a member to a room, creating the room if needed.
    ///
    /// The other members receive a `join` frame carrying the new headcount, which is
    /// also returned.
    pub async fn join(&self, room_id: &RoomId, member: Member) -> usize {
        loop {
            let room = self.lookup_or_create(room_id);
            let mut members = room.members.lock().await;
            if members.retired {
                // Emptied and unlinked between lookup and lock; take the fresh room.
                continue;
            }

            members.by_connection.insert(member.connection_id, member.clone());
            let count = members.by_connection.len();
            info!(room_id = %room_id, client_id = %member.client_id, count, "client joined room");

            let event = RoomMessage::headcount(Action::Join, room_id, &member.client_id, count);
            if let Err(e) = fan_out(&members, &event, &Audience::Others(member.client_id.clone())).await {
                warn!(room_id = %room_id, "join notification not sent: {e}");
            }
            return count;
        }
    }

    /// Remove a connection from a room.
    ///
    /// Idempotent: returns `None` (and does nothing) when the connection is not in the
    /// room or the room no longer exists. Otherwise returns the remaining headcount; the
    /// room is dropped from the registry when that reaches zero, else the remaining
    /// members receive a `leave` frame.
    pub async fn leave(&self, room_id: &RoomId, connection_id: ConnectionId) -> Option<usize> {
        let room = self.lookup(room_id.as_str())?;
        let mut members = room.members.lock().await;
        let member = members.by_connection.remove(&connection_id)?;
        let remaining = members.by_connection.len();
        info!(room_id = %room_id, client_id = %member.client_id, remaining, "client left room");

        if remaining == 0 {
            members.retired = true;
            self.unlink(room_id, &room);
        } else {
            let event = RoomMessage::headcount(Action::Leave, room_id, &member.client_id, remaining);
            if let Err(e) = fan_out(&members, &event, &Audience::Others(member.client_id)).await {
                warn!(room_id = %room_id, "leave notification not sent: {e}");
            }
        }
        Some(remaining)
    }

    /// Deliver `message` to the room named by `message.room_id`.
    ///
    /// A missing room is not an error: it may have just emptied.
    pub async fn publish(
        &self,
        message: &RoomMessage,
        audience: Audience,
    ) -> Result<DeliveryReport, MessageError> {
        let Some(room) = self.lookup(&message.room_id) else {
            debug!(room_id = %message.room_id, "publish to absent room dropped");
            return Ok(DeliveryReport::default());
        };
        let members = room.members.lock().await;
        fan_out(&members, message, &audience).await
    }

    /// Current headcount; zero for a room that does not exist.
    pub async fn member_count(&self, room_id: &str) -> usize {
        match self.lookup(room_id) {
            Some(room) => room.members.lock().await.by_connection.len(),
            None => 0,
        }
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.lookup(room_id).is_some()
    }

    /// Headcount of every live room.
    pub async fn occupancy(&self) -> BTreeMap<String, usize> {
        let rooms: Vec<(RoomId, Arc<Room>)> = {
            let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
            rooms.iter().map(|(id, room)| (id.clone(), room.clone())).collect()
        };

        let mut out = BTreeMap::new();
        for (id, room) in rooms {
            let members = room.members.lock().await;
            if !members.retired && !members.by_connection.is_empty() {
                out.insert(id.to_string(), members.by_connection.len());
            }
        }
        out
    }
}

/// Serialize once and write the same frame to every selected member.
///
/// Runs under the caller's room lock. A failing recipient is logged and skipped.
async fn fan_out(
    members: &Members,
    message: &RoomMessage,
    audience: &Audience,
) -> Result<DeliveryReport, MessageError> {
    let frame: Frame = Frame::from(message.encode()?);
    let mut report = DeliveryReport::default();

    for member in members.by_connection.values() {
        if !audience.includes(member) {
            continue;
        }
        match member.sink.send(frame.clone()).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    room_id = %message.room_id,
                    client_id = %member.client_id,
                    connection_id = %member.connection_id,
                    "broadcast delivery failed: {e}"
                );
            }
        }
    }

    Ok(report)
}
