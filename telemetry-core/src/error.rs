//! Error taxonomy for the engine. Plain enums with manual `Display`/`Error`
//! impls, matching the reference crate's `CollectError`/`PgCollectError`
//! style rather than pulling in an error-derive crate.

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// The durable store could not be opened or is permanently disabled.
    StoreUnavailable(String),
    /// The store was busy; the caller should retry on the next cycle.
    StoreBusyRetryable,
    /// On-disk schema version is older than this engine can read.
    SchemaIncompatible { found: i64, minimum: i64 },
    /// A table grew past what the process can allocate.
    MemoryExhausted(&'static str),
    /// A request on the line or HTTP surface could not be parsed.
    MalformedRequest(String),
    /// An internal bounds-check failed; indicates an implementation bug,
    /// not a user-input problem.
    OutOfBounds { what: &'static str, location: &'static str },
    /// The requested value is legitimately inaccessible under the active
    /// privacy level. Not surfaced to callers as an error — read paths
    /// return a sentinel instead (spec.md §7) — but kept here as a typed
    /// marker for internal plumbing that wants to short-circuit.
    PrivacyDenied,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
            EngineError::StoreBusyRetryable => write!(f, "store busy, will retry"),
            EngineError::SchemaIncompatible { found, minimum } => write!(
                f,
                "schema version {found} is older than minimum supported {minimum}"
            ),
            EngineError::MemoryExhausted(table) => write!(f, "memory exhausted growing {table}"),
            EngineError::MalformedRequest(msg) => write!(f, "malformed request: {msg}"),
            EngineError::OutOfBounds { what, location } => {
                write!(f, "out of bounds accessing {what} at {location}")
            }
            EngineError::PrivacyDenied => write!(f, "privacy level denies this value"),
        }
    }
}

impl std::error::Error for EngineError {}
