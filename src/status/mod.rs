//! Status publishing: a latest-value-per-key map plus a live broadcast
//! stream of every update in publish order.
//!
//! Publishers are the workflow steps; subscribers are whatever wants to
//! render progress (the terminal panel, a log tailer, a test). Subscribers
//! that attach late do not see earlier messages; only the latest value
//! per key survives, via [`StatusBus::latest`].

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Keys recognized by status observers. Each maps to one row of the
/// status panel; `Status` is the free-form narrative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusKey {
    Dsn,
    User,
    Company,
    CheckDate,
    Hours,
    Amount,
    CheckCount,
    ReportCount,
    Status,
}

impl StatusKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKey::Dsn => "Database",
            StatusKey::User => "User",
            StatusKey::Company => "Company",
            StatusKey::CheckDate => "Check Date",
            StatusKey::Hours => "Total Hours",
            StatusKey::Amount => "Total Amount",
            StatusKey::CheckCount => "Check Count",
            StatusKey::ReportCount => "Reports Count",
            StatusKey::Status => "Status",
        }
    }
}

impl std::fmt::Display for StatusKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single published status update.
#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub key: StatusKey,
    pub message: String,
}

/// Thread-safe status bus: last-value-wins per key, broadcast to all
/// live subscribers.
pub struct StatusBus {
    latest: Mutex<HashMap<StatusKey, String>>,
    tx: broadcast::Sender<StatusUpdate>,
}

impl Default for StatusBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            latest: Mutex::new(HashMap::new()),
            tx,
        }
    }
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the latest value for `key` and fan the update out to every
    /// current subscriber. Same-key messages are strictly ordered; a send
    /// with no subscribers is not an error.
    pub fn publish(&self, key: StatusKey, message: impl Into<String>) {
        let message = message.into();
        self.latest.lock().unwrap().insert(key, message.clone());
        let _ = self.tx.send(StatusUpdate { key, message });
    }

    /// Subscribe to live updates. Messages published before this call are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    /// Latest message published under `key`, if any.
    pub fn latest(&self, key: StatusKey) -> Option<String> {
        self.latest.lock().unwrap().get(&key).cloned()
    }

    /// Snapshot of the latest value for every key published so far.
    pub fn snapshot(&self) -> HashMap<StatusKey, String> {
        self.latest.lock().unwrap().clone()
    }
}
