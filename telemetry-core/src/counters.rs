//! Process-wide counters, the blocking toggle, and the current privacy
//! level. Table sizes are derived from the entity tables and ring rather
//! than duplicated here, so they can never drift out of sync.

use crate::model::PrivacyLevel;

#[derive(Debug)]
pub struct GlobalCounters {
    pub total: u64,
    pub blocked: u64,
    pub cached: u64,
    pub forwarded: u64,
    pub unknown: u64,
    pub blocking_enabled: bool,
    pub privacy_level: PrivacyLevel,
}

impl Default for GlobalCounters {
    fn default() -> Self {
        Self {
            total: 0,
            blocked: 0,
            cached: 0,
            forwarded: 0,
            unknown: 0,
            blocking_enabled: true,
            privacy_level: PrivacyLevel::None,
        }
    }
}

impl GlobalCounters {
    pub fn new(privacy_level: PrivacyLevel) -> Self {
        Self {
            privacy_level,
            ..Default::default()
        }
    }

    /// Records the outcome of one ingested query. `total` always increments;
    /// exactly one of the other counters follows, per spec.md §4.G.
    pub fn record_status(&mut self, status: crate::model::QueryStatus) {
        use crate::model::QueryStatus::*;
        self.total += 1;
        match status {
            Unknown => self.unknown += 1,
            Gravity | Wildcard | Blacklist | ExternalBlocked => self.blocked += 1,
            Forwarded => self.forwarded += 1,
            Cached => self.cached += 1,
        }
    }
}
