//! Read-only status surface
//!
//! Every value is a string: decimal integers, `True`/`False`, state names,
//! or `none` when nothing is known. The engine refreshes the shared snapshot
//! after each message; readers never see the coordinator itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::coordinator::PortageUpdateCoordinator;
use crate::state_store::StateStore;

/// Every key the status surface answers
pub const STATUS_KEYS: &[&str] = &[
    "sync_last",
    "sync_count",
    "sync_state",
    "sync_next",
    "sync_errors",
    "sync_in_progress",
    "world_last_start",
    "world_last_stop",
    "world_last_state",
    "world_last_total",
    "world_last_failed",
    "world_in_progress",
    "pending_packages",
    "portage_update",
    "pretend_state",
];

const NONE: &str = "none";

fn flag(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

/// One consistent set of status values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    values: BTreeMap<&'static str, String>,
}

impl StatusSnapshot {
    /// Live values from a running daemon
    pub fn capture(coord: &PortageUpdateCoordinator) -> Self {
        let mut snapshot = Self::from_store(coord.store());

        let next = if coord.policy.sync_enabled {
            coord
                .sync
                .next_due(&coord.policy)
                .map_or_else(|| "0".to_string(), |ts| ts.to_string())
        } else {
            NONE.to_string()
        };
        snapshot.insert("sync_next", next);
        snapshot.insert("sync_state", coord.sync.state.as_str().to_string());
        snapshot.insert(
            "sync_in_progress",
            flag(coord.sync.running || coord.active.sync),
        );
        snapshot.insert("world_in_progress", flag(coord.world.in_progress));
        snapshot.insert("pretend_state", coord.pretend.state.as_str().to_string());
        snapshot
    }

    /// Persisted values only; live keys read `none`
    pub fn from_store(store: &StateStore) -> Self {
        let mut values: BTreeMap<&'static str, String> = STATUS_KEYS
            .iter()
            .map(|&key| (key, NONE.to_string()))
            .collect();
        values.extend(store.snapshot());
        Self { values }
    }

    fn insert(&mut self, key: &'static str, value: String) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Key/value pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(key, value)| (*key, value.as_str()))
    }
}

/// Status shared between the engine and readers
#[derive(Debug, Default)]
pub struct SharedStatus {
    pub snapshot: Arc<RwLock<StatusSnapshot>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot without waiting; a held read lock skips this
    /// refresh and the next message catches up.
    pub fn publish(&self, snapshot: StatusSnapshot) -> bool {
        match self.snapshot.try_write() {
            Ok(mut current) => {
                *current = snapshot;
                true
            }
            Err(_) => false,
        }
    }
}

/// StatusService trait for querying daemon status
#[trait_variant::make(StatusService: Send)]
pub trait LocalStatusService {
    /// Value of one key; `None` for unknown keys
    async fn get(&self, key: &str) -> Option<String>;

    /// All keys and values
    async fn snapshot(&self) -> BTreeMap<String, String>;

    fn keys(&self) -> &'static [&'static str];
}

/// Default implementation using SharedStatus
#[derive(Debug, Clone)]
pub struct SharedStatusService {
    status: Arc<SharedStatus>,
}

impl SharedStatusService {
    pub fn new(status: Arc<SharedStatus>) -> Self {
        Self { status }
    }
}

impl LocalStatusService for SharedStatusService {
    async fn get(&self, key: &str) -> Option<String> {
        self.status
            .snapshot
            .read()
            .await
            .get(key)
            .map(str::to_string)
    }

    async fn snapshot(&self) -> BTreeMap<String, String> {
        self.status
            .snapshot
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn keys(&self) -> &'static [&'static str] {
        STATUS_KEYS
    }
}
