//! Test doubles for connection transports.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::connection::{ConnectionError, ConnectionSink, Frame, FrameSource};
use crate::message::RoomMessage;

/// Sink that records every frame it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<Frame>>,
    closed: Mutex<bool>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<RoomMessage> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|f| RoomMessage::decode(f).expect("recorded frame decodes"))
            .collect()
    }

    pub fn clear(&self) {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ConnectionSink for RecordingSink {
    async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).push(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }
}

/// Sink whose every write fails.
#[derive(Debug, Default)]
pub struct FailingSink;

#[async_trait]
impl ConnectionSink for FailingSink {
    async fn send(&self, _frame: Frame) -> Result<(), ConnectionError> {
        Err(ConnectionError::Transport("broken pipe".to_string()))
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        Err(ConnectionError::Closed)
    }
}

/// Source that replays a fixed script of reads.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    reads: VecDeque<Result<Option<String>, ConnectionError>>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            reads: frames.into_iter().map(|f| Ok(Some(f.to_string()))).collect(),
        }
    }

    pub fn then_fail(mut self) -> Self {
        self.reads
            .push_back(Err(ConnectionError::Transport("connection reset".to_string())));
        self
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Option<String>, ConnectionError> {
        self.reads.pop_front().unwrap_or(Ok(None))
    }
}
