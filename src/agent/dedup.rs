use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use crate::agent::types::NewTokenEvent;

/// Outcome of screening a discovery event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    /// Malformed event or agent not ready.
    Rejected(&'static str),
    /// Admitted for this mint within the current window.
    AlreadySeen,
    Admitted,
}

impl Screening {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Screening::Admitted)
    }
}

/// Time-windowed first-seen filter keyed by mint.
pub struct DedupFilter {
    seen: DashMap<String, Instant>,
    window: Duration,
}

impl DedupFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    /// Admit the first event for a mint per window.
    ///
    /// Lookup and insert happen under the same shard lock, so concurrent
    /// duplicates see exactly one `Admitted`.
    pub fn screen(&self, event: &NewTokenEvent, ready: bool) -> Screening {
        if !ready {
            return Screening::Rejected("agent not ready");
        }
        if event.mint.is_empty() {
            return Screening::Rejected("missing mint");
        }
        if event.bonding_curve_key.is_empty() {
            return Screening::Rejected("missing bonding curve");
        }
        if !(event.market_cap_sol > 0.0) {
            return Screening::Rejected("zero market cap");
        }

        let now = Instant::now();
        match self.seen.entry(event.mint.clone()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    return Screening::AlreadySeen;
                }
                entry.insert(now);
                Screening::Admitted
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Screening::Admitted
            }
        }
    }

    /// Drop entries older than the window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.seen.len();
        let now = Instant::now();
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < self.window);
        let removed = before.saturating_sub(self.seen.len());
        if removed > 0 {
            debug!("Dedup purge removed {} expired mints", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
