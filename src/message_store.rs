//! Ingestion entry point of the message store.
//!
//! The store owns chat messages; the session layer only pushes inbound
//! messages into it and never reads back.

use serde_json::Value;
use tokio::sync::mpsc;

pub trait MessageSink: Send + Sync {
    /// Called once per inbound message with the payload as received
    fn add_new_message(&self, message: Value);
}

/// Forward into a channel owned by the store's task
impl MessageSink for mpsc::UnboundedSender<Value> {
    fn add_new_message(&self, message: Value) {
        if self.send(message).is_err() {
            log::warn!("Message store is gone; dropping inbound message");
        }
    }
}
