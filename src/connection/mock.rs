//! In-memory connection for tests

use super::{Connection, FrameSender};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// Mock connection recording every payload sent
///
/// Clones share state, so a test keeps one clone while the controller owns
/// another.
#[derive(Clone, Default)]
pub struct MockConnection {
    inner: Arc<Mutex<MockConnectionInner>>,
}

#[derive(Default)]
struct MockConnectionInner {
    frames: Option<FrameSender>,
    sent: Vec<Vec<u8>>,
    fail_connect: bool,
}

impl MockConnection {
    /// Create a new mock connection
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose connect always fails
    pub fn unreachable() -> Self {
        let mock = Self::new();
        mock.inner.lock().fail_connect = true;
        mock
    }

    /// Payloads sent so far, oldest first
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().sent.clone()
    }

    /// Forget recorded payloads
    pub fn clear_sent(&self) {
        self.inner.lock().sent.clear();
    }

    /// Deliver an inbound payload as if the device had sent it
    ///
    /// Returns false when not connected.
    pub fn inject(&self, data: &[u8]) -> bool {
        match &self.inner.lock().frames {
            Some(frames) => frames.send(Bytes::copy_from_slice(data)).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(&self, frames: FrameSender) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock connection refused",
            )));
        }
        inner.frames = Some(frames);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.lock().frames = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().frames.is_some()
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.frames.is_none() {
            return Err(Error::NotConnected);
        }
        inner.sent.push(data.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
