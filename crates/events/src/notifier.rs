//! Hook through which mutating services announce committed changes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::ident::{ClientId, RoomId};
use crate::message::{Action, RoomMessage};
use crate::registry::{Audience, RoomRegistry};

/// Client id stamped on notices that no client originated.
pub const SERVER_CLIENT_ID: &str = "server";

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotice {
    pub room_id: RoomId,
    /// Client that caused the change; it is excluded from delivery.
    pub origin: Option<ClientId>,
    pub data: JsonValue,
}

/// Fire-and-forget: implementations log failures, they never surface them.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, notice: ChangeNotice);
}

#[async_trait]
impl<N> ChangeNotifier for Arc<N>
where
    N: ChangeNotifier + ?Sized,
{
    async fn notify(&self, notice: ChangeNotice) {
        (**self).notify(notice).await
    }
}

#[async_trait]
impl ChangeNotifier for RoomRegistry {
    async fn notify(&self, notice: ChangeNotice) {
        let (client_id, audience) = match notice.origin {
            Some(origin) => (origin.clone(), Audience::Others(origin)),
            None => match ClientId::parse(SERVER_CLIENT_ID) {
                Ok(server) => (server, Audience::Everyone),
                Err(_) => return,
            },
        };

        let message = RoomMessage::new(Action::Update, &notice.room_id, &client_id, notice.data);
        if let Err(e) = self.publish(&message, audience).await {
            warn!(room_id = %notice.room_id, "change notice not published: {e}");
        }
    }
}
