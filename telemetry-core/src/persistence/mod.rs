//! Persistence worker (spec.md §4.H): reconciles in-memory state with a
//! durable SQLite store on a timer, and replays that store back into memory
//! once at startup. Grounded in `database.c`.

mod schema;
mod worker;

pub use schema::{open, CURRENT_SCHEMA_VERSION};
pub use worker::{bootstrap, prune_aged_rows, run_flush_cycle, spawn, FlushOutcome};
