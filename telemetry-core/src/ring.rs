//! The query ring: a monotonically indexed, append-only log of query
//! records. Backed by a plain `Vec`, whose geometric reallocation already
//! gives us the growth behavior spec.md §4.C asks for; mutation happens in
//! place under the same lock taken for reads, so no reader ever observes a
//! half-written record.

use crate::interner::Handle;
use crate::model::{DnssecStatus, PrivacyLevel, QueryStatus, QueryType, ReplyType};

#[derive(Clone, Debug)]
pub struct QueryRecord {
    pub timestamp: i64,
    pub qtype: QueryType,
    pub status: QueryStatus,
    pub domain_id: usize,
    pub client_id: usize,
    pub upstream_id: Option<usize>,
    pub bucket_id: usize,
    /// `0` means "not yet persisted"; set once by the persistence worker.
    pub db_id: i64,
    pub response_ms: u32,
    pub dnssec: DnssecStatus,
    pub reply: ReplyType,
    pub ad_flag: bool,
    pub complete: bool,
    pub privacy_level: PrivacyLevel,
}

impl QueryRecord {
    pub fn new(
        timestamp: i64,
        qtype: QueryType,
        status: QueryStatus,
        domain_id: usize,
        client_id: usize,
        upstream_id: Option<usize>,
        bucket_id: usize,
        privacy_level: PrivacyLevel,
    ) -> Self {
        // A record starts incomplete only while genuinely awaiting an
        // upstream answer; anything resolved locally (cached, blocked) is
        // complete the moment it's recorded.
        let complete = status != QueryStatus::Forwarded;
        Self {
            timestamp,
            qtype,
            status,
            domain_id,
            client_id,
            upstream_id,
            bucket_id,
            db_id: 0,
            response_ms: 0,
            dnssec: DnssecStatus::Unknown,
            reply: ReplyType::Unknown,
            ad_flag: false,
            complete,
            privacy_level,
        }
    }
}

#[derive(Default)]
pub struct QueryRing {
    records: Vec<QueryRecord>,
}

impl QueryRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record`, returning its stable index.
    pub fn append(&mut self, record: QueryRecord) -> usize {
        let index = self.records.len();
        self.records.push(record);
        index
    }

    pub fn get(&self, index: usize) -> Option<&QueryRecord> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut QueryRecord> {
        self.records.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &QueryRecord)> {
        self.records.iter().enumerate()
    }

    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = (usize, &QueryRecord)> {
        self.records.iter().enumerate().skip(start)
    }
}

/// Resolves a handle, falling back to the empty string for out-of-range
/// handles — used when projecting ring entries for display.
pub fn resolve_or_empty(strings: &crate::interner::StringInterner, handle: Handle) -> &str {
    strings.resolve(handle)
}
