//! In-memory [`FrameSink`] for tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::StreamError;
use crate::socket::FrameSink;

/// Records every frame written to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Create an open sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far, in order.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Frames parsed as JSON.
    pub fn json_frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// Make later writes fail with [`StreamError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&self, text: String) -> Result<(), StreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        // Yield so concurrent senders interleave.
        tokio::task::yield_now().await;
        self.frames.lock().push(text);
        Ok(())
    }
}
