//! The ingest API (spec.md §4.G) and the single data lock (spec.md §5) that
//! protects the string arena, entity tables, query ring, time buckets, and
//! global counters together — they move together, and one lock keeps every
//! cross-table invariant trivially true.

use crate::buckets::BucketAccumulator;
use crate::config::EngineConfig;
use crate::counters::GlobalCounters;
use crate::entities::EntityTables;
use crate::error::EngineError;
use crate::interner::StringInterner;
use crate::model::{PrivacyLevel, QueryStatus, QueryType};
use crate::ring::{QueryRecord, QueryRing};
use std::sync::Mutex;

/// Everything behind the one data lock.
pub struct EngineState {
    pub strings: StringInterner,
    pub entities: EntityTables,
    pub ring: QueryRing,
    pub buckets: BucketAccumulator,
    pub counters: GlobalCounters,
    /// Ring index the persistence worker has scanned up to. Lives here,
    /// not in the worker, because bootstrap needs to initialize it too.
    pub last_saved_index: usize,
}

impl EngineState {
    fn new(privacy_level: PrivacyLevel) -> Self {
        Self {
            strings: StringInterner::new(),
            entities: EntityTables::new(),
            ring: QueryRing::new(),
            buckets: BucketAccumulator::new(),
            counters: GlobalCounters::new(privacy_level),
            last_saved_index: 0,
        }
    }
}

pub struct Engine {
    state: Mutex<EngineState>,
    pub config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let state = EngineState::new(config.privacy_level);
        Self {
            state: Mutex::new(state),
            config,
        }
    }

    /// Runs `f` with shared read access to the engine state under the data
    /// lock. Handlers copy out what they need (or, for small N, format
    /// directly) and release before returning.
    pub fn with_state<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        let guard = self.state.lock().expect("engine lock poisoned");
        f(&guard)
    }

    /// Runs `f` with exclusive access, for ingest and the persistence
    /// worker's stop-the-world flush.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut guard = self.state.lock().expect("engine lock poisoned");
        f(&mut guard)
    }

    pub fn privacy_level(&self) -> PrivacyLevel {
        self.with_state(|s| s.counters.privacy_level)
    }

    pub fn set_privacy_level(&self, level: PrivacyLevel) {
        self.with_state_mut(|s| s.counters.privacy_level = level);
    }

    pub fn blocking_enabled(&self) -> bool {
        self.with_state(|s| s.counters.blocking_enabled)
    }

    pub fn set_blocking_enabled(&self, enabled: bool) {
        self.with_state_mut(|s| s.counters.blocking_enabled = enabled);
    }

    /// Records a new query. `upstream_ip` must be `Some` when `status` is
    /// `Forwarded` (spec.md §3 invariant); any other combination is a
    /// malformed event from the caller.
    pub fn on_new_query(
        &self,
        timestamp: i64,
        qtype: QueryType,
        domain: &str,
        client_ip: &str,
        status: QueryStatus,
        upstream_ip: Option<&str>,
    ) -> Result<usize, EngineError> {
        if status == QueryStatus::Forwarded && upstream_ip.is_none() {
            return Err(EngineError::MalformedRequest(
                "forwarded status requires an upstream".into(),
            ));
        }

        self.with_state_mut(|state| {
            let privacy_level = state.counters.privacy_level;

            let domain_id = state.entities.find_or_insert_domain(&mut state.strings, domain);
            let (client_id, client_is_new) =
                state.entities.find_or_insert_client(&mut state.strings, client_ip);
            if client_is_new {
                state.buckets.extend_clients();
            }
            let upstream_id = match upstream_ip {
                Some(ip) => Some(state.entities.find_or_insert_upstream(&mut state.strings, ip)),
                None => None,
            };

            let client_count = state.entities.clients.len();
            let bucket_id = state.buckets.bucket_for(timestamp, client_count);

            // Update entity and bucket counters before building the record
            // so every field on the record matches the counters it caused.
            state.entities.domains[domain_id].total += 1;
            state.entities.clients[client_id].total += 1;
            state.entities.clients[client_id].last_seen = timestamp;
            if status.is_blocked() {
                state.entities.domains[domain_id].blocked += 1;
                state.entities.clients[client_id].blocked += 1;
            }
            if let Some(uid) = upstream_id {
                state.entities.upstreams[uid].total += 1;
            }

            let bucket = state.buckets.get_mut(bucket_id);
            bucket.total += 1;
            bucket.per_type[qtype as usize] += 1;
            bucket.per_client[client_id] += 1;
            if status.is_blocked() {
                bucket.blocked += 1;
            }
            if status == QueryStatus::Cached {
                bucket.cached += 1;
            }

            state.counters.record_status(status);

            let record = QueryRecord::new(
                timestamp, qtype, status, domain_id, client_id, upstream_id, bucket_id,
                privacy_level,
            );
            Ok(state.ring.append(record))
        })
    }

    /// Transitions a query from an undetermined status to `Forwarded` once
    /// the resolver has actually sent it upstream, recording which upstream.
    /// A no-op on already-terminal statuses (cached/blocked): those were
    /// decided without going upstream.
    pub fn on_upstream_sent(&self, query_index: usize, upstream_ip: &str) -> Result<(), EngineError> {
        self.with_state_mut(|state| {
            let upstream_id = state.entities.find_or_insert_upstream(&mut state.strings, upstream_ip);

            let record = state
                .ring
                .get_mut(query_index)
                .ok_or(EngineError::OutOfBounds {
                    what: "ring",
                    location: "on_upstream_sent",
                })?;

            if record.status != QueryStatus::Unknown {
                return Ok(());
            }

            // Undo the Unknown tally this query contributed, then re-tally
            // as Forwarded — the only path that legitimately reclassifies
            // a query after ingest.
            record.status = QueryStatus::Forwarded;
            record.upstream_id = Some(upstream_id);
            let bucket_id = record.bucket_id;

            state.counters.unknown -= 1;
            state.counters.forwarded += 1;
            state.entities.upstreams[upstream_id].total += 1;
            let _ = state.buckets.get_mut(bucket_id); // bucket totals unaffected by reclassification
            Ok(())
        })
    }

    /// Records the upstream answer: response time, DNSSEC outcome, reply
    /// classification, and the AD flag, then marks the query complete.
    pub fn on_reply(
        &self,
        query_index: usize,
        response_ms: u32,
        dnssec: crate::model::DnssecStatus,
        reply: crate::model::ReplyType,
        ad_flag: bool,
    ) -> Result<(), EngineError> {
        self.with_state_mut(|state| {
            let record = state
                .ring
                .get_mut(query_index)
                .ok_or(EngineError::OutOfBounds {
                    what: "ring",
                    location: "on_reply",
                })?;
            record.response_ms = response_ms;
            record.dnssec = dnssec;
            record.reply = reply;
            record.ad_flag = ad_flag;
            record.complete = true;
            Ok(())
        })
    }

    /// Replays one row read back from the durable store into memory exactly
    /// as bootstrap (spec.md §4.H) requires: the record is already
    /// `complete`, already has a `db_id`, and participates in every counter
    /// and bucket update a live ingest would have caused — except it never
    /// re-derives a status it can't map, it just counts it as `unknown`
    /// without categorising it further (spec.md §9, Open Question c).
    pub fn bootstrap_insert(
        &self,
        timestamp: i64,
        qtype: QueryType,
        status: QueryStatus,
        domain: &str,
        client_ip: &str,
        upstream_ip: Option<&str>,
        db_id: i64,
    ) -> usize {
        self.with_state_mut(|state| {
            let privacy_level = state.counters.privacy_level;
            let domain_id = state.entities.find_or_insert_domain(&mut state.strings, domain);
            let (client_id, client_is_new) =
                state.entities.find_or_insert_client(&mut state.strings, client_ip);
            if client_is_new {
                state.buckets.extend_clients();
            }
            let upstream_id = upstream_ip
                .map(|ip| state.entities.find_or_insert_upstream(&mut state.strings, ip));

            let client_count = state.entities.clients.len();
            let bucket_id = state.buckets.bucket_for(timestamp, client_count);

            state.entities.domains[domain_id].total += 1;
            state.entities.clients[client_id].total += 1;
            state.entities.clients[client_id].last_seen = timestamp;
            if status.is_blocked() {
                state.entities.domains[domain_id].blocked += 1;
                state.entities.clients[client_id].blocked += 1;
            }
            if let Some(uid) = upstream_id {
                state.entities.upstreams[uid].total += 1;
            }

            let bucket = state.buckets.get_mut(bucket_id);
            bucket.total += 1;
            bucket.per_type[qtype as usize] += 1;
            bucket.per_client[client_id] += 1;
            if status.is_blocked() {
                bucket.blocked += 1;
            }
            if status == QueryStatus::Cached {
                bucket.cached += 1;
            }

            state.counters.record_status(status);

            let mut record = QueryRecord::new(
                timestamp, qtype, status, domain_id, client_id, upstream_id, bucket_id,
                privacy_level,
            );
            record.complete = true;
            record.db_id = db_id;
            let index = state.ring.append(record);
            state.last_saved_index = state.last_saved_index.max(index + 1);
            index
        })
    }

    /// Transitions a domain's regex classification on first match. The
    /// state machine is monotonic: once `Blocked` or `NotBlocked`, later
    /// calls are no-ops (spec.md §9, Open Question a).
    pub fn on_regex_result(&self, domain_index: usize, matched: bool) -> Result<(), EngineError> {
        self.with_state_mut(|state| {
            let domain = state
                .entities
                .domains
                .get_mut(domain_index)
                .ok_or(EngineError::OutOfBounds {
                    what: "domains",
                    location: "on_regex_result",
                })?;
            if domain.regex_state == crate::entities::RegexState::Unknown {
                domain.regex_state = if matched {
                    crate::entities::RegexState::Blocked
                } else {
                    crate::entities::RegexState::NotBlocked
                };
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryStatus;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn scenario_1_single_forwarded_query_stats() {
        let e = engine();
        e.on_new_query(
            1_700_000_000,
            QueryType::A,
            "example.com",
            "10.0.0.1",
            QueryStatus::Forwarded,
            Some("8.8.8.8"),
        )
        .unwrap();

        e.with_state(|s| {
            assert_eq!(s.counters.total, 1);
            assert_eq!(s.counters.blocked, 0);
            assert_eq!(s.counters.forwarded, 1);
            assert_eq!(s.counters.cached, 0);
            assert_eq!(s.entities.domains.len(), 1);
            assert_eq!(s.entities.clients.len(), 1);
        });
    }

    #[test]
    fn scenario_2_gravity_blocks_domain() {
        let e = engine();
        let idx = e
            .on_new_query(
                1_700_000_000,
                QueryType::A,
                "example.com",
                "10.0.0.1",
                QueryStatus::Gravity,
                None,
            )
            .unwrap();

        e.with_state(|s| {
            assert_eq!(s.counters.blocked, 1);
            let rec = s.ring.get(idx).unwrap();
            assert_eq!(s.entities.domains[rec.domain_id].blocked, 1);
            assert_eq!(s.entities.domains[rec.domain_id].total, 1);
        });
    }

    #[test]
    fn forwarded_without_upstream_is_rejected() {
        let e = engine();
        let err = e
            .on_new_query(1, QueryType::A, "a.test", "10.0.0.1", QueryStatus::Forwarded, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedRequest(_)));
    }

    #[test]
    fn reply_marks_query_complete() {
        let e = engine();
        let idx = e
            .on_new_query(
                1,
                QueryType::A,
                "a.test",
                "10.0.0.1",
                QueryStatus::Forwarded,
                Some("8.8.8.8"),
            )
            .unwrap();
        e.with_state(|s| assert!(!s.ring.get(idx).unwrap().complete));
        e.on_reply(idx, 12, crate::model::DnssecStatus::Secure, crate::model::ReplyType::Ip, true)
            .unwrap();
        e.with_state(|s| {
            let rec = s.ring.get(idx).unwrap();
            assert!(rec.complete);
            assert_eq!(rec.response_ms, 12);
            assert!(rec.ad_flag);
        });
    }

    #[test]
    fn regex_result_is_monotonic() {
        let e = engine();
        e.on_new_query(1, QueryType::A, "a.test", "10.0.0.1", QueryStatus::Cached, None)
            .unwrap();
        e.on_regex_result(0, true).unwrap();
        e.on_regex_result(0, false).unwrap(); // no-op, already terminal
        e.with_state(|s| assert_eq!(s.entities.domains[0].regex_state, crate::entities::RegexState::Blocked));
    }

    #[test]
    fn privacy_level_is_frozen_at_ingest() {
        let e = engine();
        e.on_new_query(1, QueryType::A, "a.test", "10.0.0.1", QueryStatus::Cached, None)
            .unwrap();
        e.set_privacy_level(PrivacyLevel::Maximum);
        e.with_state(|s| {
            let rec = s.ring.get(0).unwrap();
            assert_eq!(rec.privacy_level, PrivacyLevel::None);
        });
    }

    #[test]
    fn new_client_extends_every_existing_bucket() {
        let e = engine();
        e.on_new_query(0, QueryType::A, "a.test", "10.0.0.1", QueryStatus::Cached, None)
            .unwrap();
        e.on_new_query(600, QueryType::A, "a.test", "10.0.0.2", QueryStatus::Cached, None)
            .unwrap();
        e.with_state(|s| {
            assert_eq!(s.buckets.len(), 2);
            for b in s.buckets.buckets() {
                assert_eq!(b.per_client.len(), 2);
            }
        });
    }
}
