// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus / push-channel subscriber registry
//!
//! Subscribers carry an in-order sink, a set of subscribed server ids, and
//! an "all" flag. Publishes happen after the authoritative mutation; a
//! failed send is logged and the subscriber kept (reconnecting is the
//! client's responsibility).

use garcon_core::{ClientMessage, PushMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type SubscriberId = u64;

struct Subscriber {
    sink: mpsc::UnboundedSender<PushMessage>,
    server_ids: HashSet<String>,
    all: bool,
}

/// Fan-out registry for push subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<SubscriberId, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; the receiver is its in-order sink.
    pub fn register(&self) -> (SubscriberId, mpsc::UnboundedReceiver<PushMessage>) {
        let (sink, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .insert(id, Subscriber { sink, server_ids: HashSet::new(), all: false });
        debug!(subscriber = id, "push subscriber registered");
        (id, rx)
    }

    pub fn unregister(&self, id: SubscriberId) {
        self.subscribers.lock().remove(&id);
        debug!(subscriber = id, "push subscriber removed");
    }

    /// Handle one inbound frame, returning an immediate reply when one is
    /// due on the same channel.
    pub fn handle_message(&self, id: SubscriberId, message: ClientMessage) -> Option<PushMessage> {
        match message {
            ClientMessage::Subscribe { server_id } => {
                let mut subscribers = self.subscribers.lock();
                if let Some(sub) = subscribers.get_mut(&id) {
                    match server_id {
                        Some(server_id) => {
                            sub.server_ids.insert(server_id.to_string());
                        }
                        None => sub.all = true,
                    }
                }
                None
            }
            ClientMessage::Unsubscribe { server_id } => {
                let mut subscribers = self.subscribers.lock();
                if let Some(sub) = subscribers.get_mut(&id) {
                    match server_id {
                        Some(server_id) => {
                            sub.server_ids.remove(server_id.as_str());
                        }
                        None => sub.all = false,
                    }
                }
                None
            }
            ClientMessage::Ping => Some(PushMessage::Pong),
            ClientMessage::Unknown => Some(PushMessage::Error {
                message: "unknown message type".to_string(),
                code: None,
            }),
        }
    }

    /// Deliver a message to every subscriber watching this server.
    pub fn publish(&self, server_id: &str, message: &PushMessage) {
        let subscribers = self.subscribers.lock();
        for (id, sub) in subscribers.iter() {
            if !(sub.all || sub.server_ids.contains(server_id)) {
                continue;
            }
            // A closed sink means the reader is gone; the subscriber is kept
            // and cleaned up when its connection task unregisters.
            if sub.sink.send(message.clone()).is_err() {
                warn!(subscriber = id, %server_id, "push send failed");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
