//! Reactive `subscribe`: a synchronous initial read plus a `std::sync::mpsc`
//! channel for follow-up deliveries whenever a matching collection is
//! written.

use serde_json::{Map, Value};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tridb_errors::Result;
use tridb_triples::Predicate;

pub(crate) struct SubscriptionEntry {
    pub(crate) id: u64,
    pub(crate) collection: String,
    pub(crate) filter: Option<Predicate>,
    pub(crate) sender: mpsc::Sender<Result<Vec<Map<String, Value>>>>,
}

pub(crate) type Registry = Arc<Mutex<Vec<SubscriptionEntry>>>;

/// An active subscription: the result set as of `subscribe` time, and a
/// channel delivering every subsequent result set after a write to the
/// subscribed collection. Dropping this (or calling [`Subscription::unsubscribe`])
/// deregisters it.
pub struct Subscription {
    pub initial: Vec<Map<String, Value>>,
    pub receiver: mpsc::Receiver<Result<Vec<Map<String, Value>>>>,
    id: u64,
    registry: Registry,
}

impl Subscription {
    pub(crate) fn new(
        initial: Vec<Map<String, Value>>,
        receiver: mpsc::Receiver<Result<Vec<Map<String, Value>>>>,
        id: u64,
        registry: Registry,
    ) -> Self {
        Self { initial, receiver, id, registry }
    }

    /// Deregister this subscription; no further results are delivered.
    pub fn unsubscribe(self) {
        self.registry.lock().expect("subscriptions lock poisoned").retain(|entry| entry.id != self.id);
    }
}
