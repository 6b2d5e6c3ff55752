/*!
 * @file inbox.rs
 * @brief The single-consumer request queue the test thread drains
 */

use crate::error::{MockError, Result};
use crate::pattern::Pattern;
use crate::request::Request;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// An unbounded, multi-producer single-consumer queue of decoded requests
/// that missed every autoresponder. Connection workers are producers; the
/// test thread is the sole consumer.
pub struct Inbox {
    sender: mpsc::UnboundedSender<Request>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Request>>,
}

impl Inbox {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: AsyncMutex::new(receiver),
        }
    }

    pub fn push(&self, request: Request) {
        // The receiver is only ever dropped together with the Inbox itself,
        // so a send error here would mean the server already shut down.
        let _ = self.sender.send(request);
    }

    /// Blocks for up to `timeout`, returning the next request or a timeout
    /// error. If a matcher `pattern` is supplied and the popped request
    /// doesn't satisfy it, the request is still consumed and an assertion
    /// mismatch is reported.
    pub async fn receive(&self, pattern: Option<&Pattern>, timeout: Duration) -> Result<Request> {
        let mut guard = self.receiver.lock().await;
        let request = match tokio::time::timeout(timeout, guard.recv()).await {
            Ok(Some(request)) => request,
            Ok(None) => return Err(MockError::ServerStopped),
            Err(_) => return Err(MockError::ReceiveTimeout(timeout)),
        };
        drop(guard);

        if let Some(pattern) = pattern {
            if !pattern.matches(&request) {
                return Err(MockError::AssertionMismatch(format!(
                    "{:?}",
                    request
                )));
            }
        }

        Ok(request)
    }

    /// Stops accepting new pushes and lets the consumer drain whatever is
    /// already queued before observing closure.
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
