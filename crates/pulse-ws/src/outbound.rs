//! Outbound message queue.
//!
//! While connected, messages go straight into the live connection's channel.
//! Otherwise they wait in a FIFO queue that is moved into the next
//! connection's channel, ahead of anything sent after it, on (re)connect.

use crate::message::OutboundMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

/// Result of `EventStreamClient::send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the live connection.
    Sent,
    /// Stored until the next connection.
    Queued,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<OutboundMessage>,
    live: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

/// Unbounded FIFO of messages waiting for a connection.
#[derive(Default)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a message to the live connection, or queue it.
    pub fn submit(&self, message: OutboundMessage) -> SendOutcome {
        let mut inner = self.inner.lock();
        if let Some(live) = &inner.live {
            match live.send(message) {
                Ok(()) => return SendOutcome::Sent,
                Err(mpsc::error::SendError(message)) => {
                    inner.live = None;
                    inner.pending.push_back(message);
                    return SendOutcome::Queued;
                }
            }
        }
        inner.pending.push_back(message);
        SendOutcome::Queued
    }

    /// Open a channel for a new connection, preloaded with the queue.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let mut inner = self.inner.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        let flushed = inner.pending.len();
        for message in inner.pending.drain(..) {
            // rx is alive, so this cannot fail
            let _ = tx.send(message);
        }
        if flushed > 0 {
            debug!(flushed, "Flushing queued messages");
        }
        inner.live = Some(tx);
        rx
    }

    /// Close a connection's channel. `failed` (the message whose write
    /// failed) and everything still unread go back to the front of the
    /// queue in their original order.
    pub fn detach(
        &self,
        mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
        failed: Option<OutboundMessage>,
    ) {
        let mut inner = self.inner.lock();
        inner.live = None;
        rx.close();

        let mut unsent: Vec<OutboundMessage> = failed.into_iter().collect();
        while let Ok(message) = rx.try_recv() {
            unsent.push(message);
        }
        if !unsent.is_empty() {
            debug!(count = unsent.len(), "Requeueing unsent messages");
        }
        for message in unsent.into_iter().rev() {
            inner.pending.push_front(message);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_live(&self) -> bool {
        self.inner.lock().live.is_some()
    }
}
