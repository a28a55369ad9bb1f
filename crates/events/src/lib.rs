//! Realtime change notification fabric.
//!
//! - `message`: the JSON frame exchanged with clients
//! - `connection`: transport seams (outbound sink, inbound frame source)
//! - `registry`: rooms of live connections + broadcast fan-out
//! - `session`: the per-connection reader loop
//! - `notifier`: the hook mutating services use to announce changes

pub mod connection;
pub mod ident;
pub mod message;
pub mod notifier;
pub mod registry;
pub mod session;

pub use connection::{ChannelSink, ConnectionError, ConnectionSink, Frame, FrameSource, Outbound};
pub use ident::{ClientId, RoomId};
pub use message::{Action, MessageError, RoomMessage};
pub use notifier::{ChangeNotice, ChangeNotifier, SERVER_CLIENT_ID};
pub use registry::{Audience, DeliveryReport, Member, RoomRegistry};
pub use session::{ConnectionState, InvalidTransition, Session, serve_connection};

#[cfg(test)]
mod testing;
