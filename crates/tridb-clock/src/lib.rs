//! Hybrid logical clock for ordering triples across a transaction and across
//! clients.
//!
//! A [`HybridTimestamp`] totally orders on `(tick, client_id)`: ties on
//! `tick` are broken by `client_id`, which callers are expected to keep
//! unique per store instance, so construction can never produce two equal
//! timestamps from the same clock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies the clock that minted a timestamp. Opaque beyond ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotone `(tick, client_id)` pair. Total order: compare `tick` first,
/// `client_id` breaks ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    pub tick: u64,
    pub client_id: ClientId,
}

impl HybridTimestamp {
    pub fn new(tick: u64, client_id: ClientId) -> Self {
        Self { tick, client_id }
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tick
            .cmp(&other.tick)
            .then_with(|| self.client_id.cmp(&other.client_id))
    }
}

/// Monotone timestamp generator for one client.
///
/// Every call to [`LogicalClock::tick`] returns a strictly greater
/// timestamp than any previous call from the same clock. The counter is
/// atomic so a `Db` shared across threads behind a mutex still mints unique
/// timestamps.
#[derive(Debug)]
pub struct LogicalClock {
    client_id: ClientId,
    counter: AtomicU64,
}

impl LogicalClock {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            counter: AtomicU64::new(0),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Mint the next timestamp for this clock's client.
    pub fn tick(&self) -> HybridTimestamp {
        let tick = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        HybridTimestamp::new(tick, self.client_id.clone())
    }

    /// Observe a remote tick (e.g. from a peer's commit) so future local
    /// timestamps remain strictly greater than anything already seen.
    pub fn observe(&self, remote_tick: u64) {
        self.counter.fetch_max(remote_tick, Ordering::SeqCst);
    }
}
