//! In-memory message broker
//!
//! Keeps one bounded outbound queue per STOMP session together with its
//! subscriptions. Messages are delivered to every subscription whose
//! destination matches exactly. A session whose queue is full is dropped
//! from the broker; its connection loop then closes it with an ERROR frame.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::metrics;
use crate::ws::frame::{
    HEADER_CONTENT_TYPE, HEADER_DESTINATION, StompCommand, StompFrame,
};

struct Subscription {
    id: String,
    destination: String,
}

/// Frames a session may have queued before it counts as too slow
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Message carried by the ERROR frame sent to an evicted session
pub const QUEUE_OVERFLOW_MESSAGE: &str = "Outbound message queue full";

struct SessionEntry {
    sender: mpsc::Sender<StompFrame>,
    subscriptions: Vec<Subscription>,
}

pub struct StompBroker {
    sessions: DashMap<String, SessionEntry>,
    message_counter: AtomicU64,
    queue_capacity: usize,
}

impl Default for StompBroker {
    fn default() -> Self {
        Self::with_queue_capacity(DEFAULT_OUTBOUND_QUEUE_CAPACITY)
    }
}

impl StompBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            message_counter: AtomicU64::new(0),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Register a session and return the receiving end of its outbound frames
    ///
    /// The receiver yields `None` once the broker evicted the session.
    pub fn register_session(&self, session_id: &str) -> mpsc::Receiver<StompFrame> {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        self.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                sender,
                subscriptions: Vec::new(),
            },
        );
        metrics::set_websocket_sessions(self.sessions.len());
        receiver
    }

    pub fn unregister_session(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            metrics::set_websocket_sessions(self.sessions.len());
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscribe(&self, session_id: &str, subscription_id: &str, destination: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        session
            .subscriptions
            .retain(|s| s.id != subscription_id);
        session.subscriptions.push(Subscription {
            id: subscription_id.to_string(),
            destination: destination.to_string(),
        });
        true
    }

    pub fn unsubscribe(&self, session_id: &str, subscription_id: &str) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let before = session.subscriptions.len();
        session.subscriptions.retain(|s| s.id != subscription_id);
        session.subscriptions.len() != before
    }

    /// Queue a frame for one session
    pub fn send_frame(&self, session_id: &str, frame: StompFrame) -> bool {
        let offered = self
            .sessions
            .get(session_id)
            .map(|session| offer(&session.sender, frame));
        match offered {
            Some(Offer::Queued) => true,
            Some(Offer::Full) => {
                self.evict(session_id);
                false
            }
            Some(Offer::Closed) | None => false,
        }
    }

    /// Deliver to every subscriber of `destination`, returning the number of deliveries
    pub fn broadcast(&self, destination: &str, content_type: &str, body: &[u8]) -> usize {
        let mut delivered = 0;
        let mut overflowed = Vec::new();
        for session in self.sessions.iter() {
            let (count, full) = self.deliver(session.value(), destination, content_type, body);
            delivered += count;
            if full {
                overflowed.push(session.key().clone());
            }
        }
        // evicting while iterating would deadlock on the shard lock
        for session_id in overflowed {
            self.evict(&session_id);
        }
        debug!(destination, delivered, "Broadcast message");
        delivered
    }

    /// Deliver to the subscriptions of a single session
    pub fn send_to_session(
        &self,
        session_id: &str,
        destination: &str,
        content_type: &str,
        body: &[u8],
    ) -> usize {
        let Some((delivered, full)) = self
            .sessions
            .get(session_id)
            .map(|session| self.deliver(session.value(), destination, content_type, body))
        else {
            return 0;
        };
        if full {
            self.evict(session_id);
        }
        delivered
    }

    /// Returns the number of queued frames and whether the queue ran full
    fn deliver(
        &self,
        session: &SessionEntry,
        destination: &str,
        content_type: &str,
        body: &[u8],
    ) -> (usize, bool) {
        let mut delivered = 0;
        for subscription in session
            .subscriptions
            .iter()
            .filter(|s| s.destination == destination)
        {
            let frame = self.message_frame(destination, &subscription.id, content_type, body);
            match offer(&session.sender, frame) {
                Offer::Queued => delivered += 1,
                Offer::Full => return (delivered, true),
                Offer::Closed => break,
            }
        }
        (delivered, false)
    }

    /// Drop a session that cannot keep up; closing its sender ends the connection loop
    fn evict(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            warn!(
                session = %session_id,
                capacity = self.queue_capacity,
                "Outbound queue full, closing session"
            );
            metrics::record_websocket_overflow();
            metrics::set_websocket_sessions(self.sessions.len());
        }
    }

    fn message_frame(
        &self,
        destination: &str,
        subscription_id: &str,
        content_type: &str,
        body: &[u8],
    ) -> StompFrame {
        let message_id = self.message_counter.fetch_add(1, Ordering::Relaxed);
        StompFrame::new(StompCommand::Message)
            .header(HEADER_DESTINATION, destination)
            .header(HEADER_CONTENT_TYPE, content_type)
            .header("subscription", subscription_id)
            .header("message-id", message_id.to_string())
            .body(body.to_vec())
    }
}

enum Offer {
    Queued,
    Full,
    Closed,
}

fn offer(sender: &mpsc::Sender<StompFrame>, frame: StompFrame) -> Offer {
    match sender.try_send(frame) {
        Ok(()) => Offer::Queued,
        Err(TrySendError::Full(_)) => Offer::Full,
        Err(TrySendError::Closed(_)) => Offer::Closed,
    }
}

/// ERROR frame written directly to a session the broker evicted
pub fn queue_overflow_frame() -> StompFrame {
    StompFrame::new(StompCommand::Error)
        .header("message", QUEUE_OVERFLOW_MESSAGE)
        .header(HEADER_CONTENT_TYPE, "text/plain")
        .body(QUEUE_OVERFLOW_MESSAGE.as_bytes().to_vec())
}
