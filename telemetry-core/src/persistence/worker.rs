//! The periodic flush cycle and the startup bootstrap import (spec.md §4.H),
//! grounded in `database.c`'s `save_to_DB` and `read_data_from_DB`.

use super::schema;
use crate::config::EngineConfig;
use crate::engine::{Engine, EngineState};
use crate::error::EngineError;
use crate::model::{QueryStatus, QueryType};
use crate::privacy;
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use std::time::Duration;

/// Consecutive insert failures tolerated before a flush cycle aborts and
/// rolls back, rather than commit a partially-saved batch.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// A still-forwarded query younger than this might get its reply before the
/// next cycle runs, so the scan stops rather than persist it as incomplete.
const GRACE_WINDOW_SECS: i64 = 2;

/// Anything older than this is implausible for a daemon that didn't exist
/// before 2017 — matches the reference resolver's bootstrap sanity check.
const MIN_PLAUSIBLE_TIMESTAMP: i64 = 1_483_228_800;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub saved: usize,
    pub pruned: u64,
}

/// Scans the ring from `state.last_saved_index`, inserts every persistable,
/// settled row into `queries`, and stamps the in-memory `db_id` only once
/// the whole batch has committed. Pruning aged rows is a separate step
/// (`prune_aged_rows`) that runs after the data lock is released.
///
/// Holds `state` for the entire cycle by design: the resolver's hot path
/// tolerates a brief pause because a flush batch is bounded by how often
/// this runs, and a single lock keeps "already saved" and "about to be
/// saved" from ever disagreeing.
pub async fn run_flush_cycle(
    conn: &mut SqliteConnection,
    state: &mut EngineState,
    now: i64,
) -> Result<FlushOutcome, EngineError> {
    schema::ensure_schema(conn).await?;

    let mut tx = conn.begin().await.map_err(schema::sqlx_err)?;

    let mut pending_stamps: Vec<(usize, i64)> = Vec::new();
    let mut delta_total: i64 = 0;
    let mut delta_blocked: i64 = 0;
    let mut max_ts = 0i64;
    let mut consecutive_errors = 0u32;
    let mut scanned_to = state.last_saved_index;
    let ring_len = state.ring.len();

    while scanned_to < ring_len {
        let (already_saved, privacy_excluded, timestamp, qtype, status, domain, client, upstream) = {
            let record = state.ring.get(scanned_to).expect("scanned_to stays in bounds");
            if !record.complete && record.timestamp > now - GRACE_WINDOW_SECS {
                break;
            }
            let domain = state
                .strings
                .resolve(state.entities.domains[record.domain_id].name)
                .to_string();
            let client = state
                .strings
                .resolve(state.entities.clients[record.client_id].ip)
                .to_string();
            let upstream = record.upstream_id.map(|id| {
                state.strings.resolve(state.entities.upstreams[id].ip).to_string()
            });
            (
                record.db_id != 0,
                !privacy::persistable(record.privacy_level),
                record.timestamp,
                record.qtype,
                record.status,
                domain,
                client,
                upstream,
            )
        };

        if already_saved || privacy_excluded {
            scanned_to += 1;
            continue;
        }

        let insert = sqlx::query(
            "INSERT INTO queries (timestamp, type, status, domain, client, upstream) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(timestamp)
        .bind(qtype as i64)
        .bind(status as i64)
        .bind(&domain)
        .bind(&client)
        .bind(&upstream)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(result) => {
                consecutive_errors = 0;
                pending_stamps.push((scanned_to, result.last_insert_rowid()));
                delta_total += 1;
                if status.is_blocked() {
                    delta_blocked += 1;
                }
                max_ts = max_ts.max(timestamp);
            }
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(error = %e, index = scanned_to, "failed to persist query row");
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    tx.rollback().await.ok();
                    return Err(EngineError::StoreBusyRetryable);
                }
            }
        }
        scanned_to += 1;
    }

    if delta_total > 0 {
        schema::add_counter(&mut *tx, schema::COUNTER_KEY_TOTAL, delta_total).await?;
    }
    if delta_blocked > 0 {
        schema::add_counter(&mut *tx, schema::COUNTER_KEY_BLOCKED, delta_blocked).await?;
    }
    if max_ts > 0 {
        schema::set_property(&mut *tx, schema::FTL_KEY_LAST_TIMESTAMP, max_ts).await?;
    }

    tx.commit().await.map_err(schema::sqlx_err)?;

    for (index, rowid) in &pending_stamps {
        if let Some(record) = state.ring.get_mut(*index) {
            record.db_id = *rowid;
        }
    }
    state.last_saved_index = scanned_to;

    Ok(FlushOutcome { saved: pending_stamps.len(), pruned: 0 })
}

/// Deletes rows older than `max_db_days`, a no-op when pruning is disabled
/// (`max_db_days == 0`). Deliberately separate from `run_flush_cycle` and
/// called without the data lock held: pruning only touches already-
/// committed on-disk rows and has no dependency on in-memory state, the
/// same reasoning `database.c`'s `DB_thread` uses when it unlocks the data
/// mutex before calling `delete_old_queries_in_DB()`.
pub async fn prune_aged_rows(
    conn: &mut SqliteConnection,
    config: &EngineConfig,
    now: i64,
) -> Result<u64, EngineError> {
    if config.max_db_days == 0 {
        return Ok(0);
    }
    let cutoff = now - i64::from(config.max_db_days) * 86_400;
    let pruned = schema::prune_older_than(&mut *conn, cutoff).await?;
    if pruned > 0 {
        tracing::info!(pruned, "pruned aged query rows");
    }
    Ok(pruned)
}

/// Replays the durable store back into memory once at startup, covering the
/// last `max_log_age_secs` of history. Rows this engine cannot make sense of
/// are discarded with a warning rather than aborting the whole import.
pub async fn bootstrap(
    engine: &Engine,
    conn: &mut SqliteConnection,
    config: &EngineConfig,
    now: i64,
) -> Result<(), EngineError> {
    schema::ensure_schema(conn).await?;
    let since = now - config.max_log_age_secs;
    let rows = schema::load_since(&mut *conn, since).await?;

    let mut imported = 0usize;
    let mut discarded = 0usize;

    for row in rows {
        if row.timestamp < MIN_PLAUSIBLE_TIMESTAMP || row.timestamp > now {
            tracing::warn!(timestamp = row.timestamp, "discarding implausible stored timestamp");
            discarded += 1;
            continue;
        }
        let Some(qtype) = QueryType::from_db(row.qtype) else {
            tracing::warn!(value = row.qtype, "unknown stored query type, discarding row");
            discarded += 1;
            continue;
        };
        if qtype == QueryType::Aaaa && !config.aaaa_query_analysis {
            continue;
        }
        if config.ignore_localhost && (row.client == "127.0.0.1" || row.client == "::1") {
            continue;
        }

        // Unknown status codes are counted but not categorised any further
        // (spec.md §9, Open Question c) — the bootstrap loop never resets
        // `counters->unknown`, it just never learns what the row was.
        let status = QueryStatus::from_db(row.status).unwrap_or(QueryStatus::Unknown);

        let upstream = if status == QueryStatus::Forwarded {
            match row.upstream.filter(|ip| !ip.is_empty()) {
                Some(ip) => Some(ip),
                None => {
                    tracing::warn!(db_id = row.db_id, "forwarded row missing upstream, discarding");
                    discarded += 1;
                    continue;
                }
            }
        } else {
            None
        };

        engine.bootstrap_insert(
            row.timestamp,
            qtype,
            status,
            &row.domain,
            &row.client,
            upstream.as_deref(),
            row.db_id,
        );
        imported += 1;
    }

    tracing::info!(imported, discarded, "bootstrap import complete");
    Ok(())
}

/// Spawns the periodic flush task. Returns `None` when persistence is
/// disabled (`DBFILE` empty), matching spec.md §6.
pub fn spawn(engine: Arc<Engine>) -> Option<tokio::task::JoinHandle<()>> {
    let db_file = engine.config.db_file.clone()?;
    let interval_secs = engine.config.db_interval_secs.max(1);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();

            let mut conn = match schema::open(&db_file).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "persistence worker could not open store, skipping cycle");
                    continue;
                }
            };

            let outcome = engine.with_state_mut(|state| {
                tokio::task::block_in_place(|| {
                    tokio::runtime::Handle::current().block_on(run_flush_cycle(&mut conn, state, now))
                })
            });

            let saved = match outcome {
                Ok(outcome) => outcome.saved,
                Err(e) => {
                    tracing::warn!(error = %e, "flush cycle failed");
                    let _ = conn.close().await;
                    continue;
                }
            };

            let pruned = match prune_aged_rows(&mut conn, &engine.config, now).await {
                Ok(pruned) => pruned,
                Err(e) => {
                    tracing::warn!(error = %e, "prune failed");
                    0
                }
            };

            if saved > 0 || pruned > 0 {
                tracing::debug!(saved, pruned, "flush cycle complete");
            }

            let _ = conn.close().await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrivacyLevel;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    async fn memory_conn() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    /// Runs an async flush cycle while holding the engine's data lock, the
    /// same way the real periodic task does — requires a multi-thread
    /// runtime because of `block_in_place`.
    fn flush_blocking(
        engine: &Engine,
        conn: &mut SqliteConnection,
        now: i64,
    ) -> Result<FlushOutcome, EngineError> {
        engine.with_state_mut(|state| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(run_flush_cycle(conn, state, now))
            })
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_persists_completed_queries() {
        let engine = engine();
        engine
            .on_new_query(1_700_000_000, QueryType::A, "example.com", "10.0.0.1", QueryStatus::Cached, None)
            .unwrap();

        let mut conn = memory_conn().await;
        let outcome = flush_blocking(&engine, &mut conn, 1_700_000_100);
        assert_eq!(outcome.unwrap().saved, 1);
        engine.with_state(|state| {
            assert_ne!(state.ring.get(0).unwrap().db_id, 0);
        });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_skips_incomplete_fresh_forwarded_query() {
        let engine = engine();
        engine
            .on_new_query(
                1_700_000_099,
                QueryType::A,
                "example.com",
                "10.0.0.1",
                QueryStatus::Forwarded,
                Some("8.8.8.8"),
            )
            .unwrap();

        let mut conn = memory_conn().await;
        let outcome = flush_blocking(&engine, &mut conn, 1_700_000_100);
        assert_eq!(outcome.unwrap().saved, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_never_persists_maximum_privacy_queries() {
        let engine = engine();
        engine.set_privacy_level(PrivacyLevel::Maximum);
        engine
            .on_new_query(1_700_000_000, QueryType::A, "example.com", "10.0.0.1", QueryStatus::Cached, None)
            .unwrap();

        let mut conn = memory_conn().await;
        let outcome = flush_blocking(&engine, &mut conn, 1_700_000_100);
        assert_eq!(outcome.unwrap().saved, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_never_persists_nostats_privacy_queries() {
        let engine = engine();
        engine.set_privacy_level(PrivacyLevel::NoStats);
        engine
            .on_new_query(1_700_000_000, QueryType::A, "example.com", "10.0.0.1", QueryStatus::Cached, None)
            .unwrap();

        let mut conn = memory_conn().await;
        let outcome = flush_blocking(&engine, &mut conn, 1_700_000_100);
        assert_eq!(outcome.unwrap().saved, 0);
    }

    #[tokio::test]
    async fn bootstrap_replays_rows_into_memory() {
        let mut conn = memory_conn().await;
        schema::ensure_schema(&mut conn).await.unwrap();
        sqlx::query(
            "INSERT INTO queries (timestamp, type, status, domain, client, upstream) \
             VALUES (1700000000, 0, 3, 'example.com', '10.0.0.1', NULL)",
        )
        .execute(&mut conn)
        .await
        .unwrap();

        let engine = engine();
        bootstrap(&engine, &mut conn, &engine.config, 1_700_000_500).await.unwrap();

        engine.with_state(|state| {
            assert_eq!(state.ring.len(), 1);
            assert_eq!(state.counters.cached, 1);
        });
    }
}
