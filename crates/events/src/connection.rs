//! Transport seams for one live duplex connection.
//!
//! The registry only ever writes to a connection through [`ConnectionSink`]; the reader
//! loop only ever reads through [`FrameSource`]. Adapters for a concrete transport
//! (e.g. an upgraded WebSocket) implement both halves.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One serialized outbound frame. Shared so a broadcast serializes once.
pub type Frame = Arc<str>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound half of a connection.
///
/// Implementations are expected to be non-blocking (buffered or async): the registry
/// calls `send` while holding a room lock.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    async fn send(&self, frame: Frame) -> Result<(), ConnectionError>;

    async fn close(&self) -> Result<(), ConnectionError>;
}

#[async_trait]
impl<S> ConnectionSink for Arc<S>
where
    S: ConnectionSink + ?Sized,
{
    async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        (**self).send(frame).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        (**self).close().await
    }
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next text frame. `Ok(None)` means the peer closed cleanly.
    async fn next_frame(&mut self) -> Result<Option<String>, ConnectionError>;
}

/// What a [`ChannelSink`] hands to the transport writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Close,
}

/// Buffered sink backed by an unbounded channel.
///
/// A writer task owns the receiving end and drains it into the real transport, so
/// `send` never waits on the network.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConnectionSink for ChannelSink {
    async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        // Writer already gone means the transport is already released.
        let _ = self.tx.send(Outbound::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_frames_then_close() {
        let (sink, mut rx) = ChannelSink::new();
        sink.send(Frame::from("hello")).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(rx.recv().await, Some(Outbound::Frame(Frame::from("hello"))));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn send_after_writer_dropped_is_closed() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert_eq!(sink.send(Frame::from("x")).await, Err(ConnectionError::Closed));
    }
}
