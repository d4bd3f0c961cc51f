//! End-to-end ingest → flush → restart → bootstrap scenarios (spec.md §8),
//! run against a real on-disk SQLite file rather than the in-memory
//! fixtures the unit tests under `src/persistence/` use.

use sqlx::Connection;
use telemetry_core::config::EngineConfig;
use telemetry_core::model::{QueryStatus, QueryType};
use telemetry_core::persistence::{self, FlushOutcome};
use telemetry_core::{Engine, EngineError};

fn flush_blocking(
    engine: &Engine,
    conn: &mut sqlx::SqliteConnection,
    now: i64,
) -> Result<FlushOutcome, EngineError> {
    engine.with_state_mut(|state| {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(persistence::run_flush_cycle(conn, state, now))
        })
    })
}

fn config_for(path: &std::path::Path) -> EngineConfig {
    EngineConfig {
        db_file: Some(path.to_string_lossy().into_owned()),
        max_db_days: 30,
        ..EngineConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_flush_restart_bootstrap_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("telemetry.db");
    let config = config_for(&db_path);
    let now = 1_700_000_000;

    {
        let engine = Engine::new(config.clone());
        for i in 0..5u32 {
            engine
                .on_new_query(
                    now - 100 + i as i64,
                    QueryType::A,
                    "example.com",
                    "10.0.0.1",
                    QueryStatus::Gravity,
                    None,
                )
                .unwrap();
        }
        let mut conn = persistence::open(&db_path.to_string_lossy()).await.unwrap();
        let outcome = flush_blocking(&engine, &mut conn, now).unwrap();
        assert_eq!(outcome.saved, 5);
        conn.close().await.unwrap();
    }

    // "kill; restart": a fresh engine, no in-memory state, reimports from disk.
    let engine = Engine::new(config.clone());
    let mut conn = persistence::open(&db_path.to_string_lossy()).await.unwrap();
    persistence::bootstrap(&engine, &mut conn, &config, now).await.unwrap();
    conn.close().await.unwrap();

    let snapshot = engine.with_state(|state| (state.ring.len(), state.counters.total, state.counters.blocked));
    assert_eq!(snapshot.0, 5);
    assert_eq!(snapshot.1, 5);
    assert_eq!(snapshot.2, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_flush_with_no_new_queries_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("telemetry.db");
    let config = config_for(&db_path);
    let now = 1_700_000_000;

    let engine = Engine::new(config.clone());
    engine
        .on_new_query(now - 10, QueryType::A, "example.com", "10.0.0.1", QueryStatus::Cached, None)
        .unwrap();

    let mut conn = persistence::open(&db_path.to_string_lossy()).await.unwrap();
    let first = flush_blocking(&engine, &mut conn, now).unwrap();
    assert_eq!(first.saved, 1);

    let second = flush_blocking(&engine, &mut conn, now + 1).unwrap();
    assert_eq!(second.saved, 0);
    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pruning_respects_max_db_days_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("telemetry.db");
    let mut config = config_for(&db_path);
    config.max_db_days = 1;
    let now = 1_700_000_000;
    let one_day = 86_400;

    let engine = Engine::new(config.clone());
    // Exactly at the cutoff: kept. One second older: pruned.
    engine
        .on_new_query(now - one_day, QueryType::A, "kept.test", "10.0.0.1", QueryStatus::Gravity, None)
        .unwrap();
    engine
        .on_new_query(
            now - one_day - 1,
            QueryType::A,
            "pruned.test",
            "10.0.0.1",
            QueryStatus::Gravity,
            None,
        )
        .unwrap();

    let mut conn = persistence::open(&db_path.to_string_lossy()).await.unwrap();
    let outcome = flush_blocking(&engine, &mut conn, now).unwrap();
    assert_eq!(outcome.saved, 2);

    // Pruning runs as its own step, without the data lock held, after the
    // flush cycle has committed both rows.
    let pruned = persistence::prune_aged_rows(&mut conn, &config, now).await.unwrap();
    assert_eq!(pruned, 1);

    let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queries").fetch_one(&mut conn).await.unwrap();
    assert_eq!(remaining.0, 1);
    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_database_bootstrap_leaves_engine_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("telemetry.db");
    let config = config_for(&db_path);

    let engine = Engine::new(config.clone());
    let mut conn = persistence::open(&db_path.to_string_lossy()).await.unwrap();
    persistence::bootstrap(&engine, &mut conn, &config, 1_700_000_000).await.unwrap();
    conn.close().await.unwrap();

    assert_eq!(engine.with_state(|state| state.ring.len()), 0);
}
