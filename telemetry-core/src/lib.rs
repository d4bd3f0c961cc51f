//! telemetry-core — the live statistics engine of a network-wide DNS
//! filter: interning and entity tables, the query ring, the ten-minute
//! time-bucket accumulator, the privacy projector, the ingest API, the
//! persistence worker, and the aggregations the request dispatcher serves.

pub mod buckets;
pub mod config;
pub mod counters;
pub mod dispatch;
pub mod engine;
pub mod entities;
pub mod error;
pub mod interner;
pub mod model;
pub mod persistence;
pub mod privacy;
pub mod ring;

pub use engine::{Engine, EngineState};
pub use error::EngineError;
