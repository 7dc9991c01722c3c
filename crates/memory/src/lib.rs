#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
#![warn(missing_docs)]
#![deny(unused_must_use)]

//! Persistent memory of one babble context, kept in an embedded SQLite file.
//!
//! Layout:
//! - `database.rs`: connection handle, schema and pragmas
//! - `codec.rs`: compressed children blobs
//! - `dictionary.rs`: token identity store (id allocation, variant counts)
//! - `banned.rs`: persisted context-specific bans
//! - `ngrams.rs`: forward/reverse transition tables for orders 2..=5
//!
//! Contract: every fallible call returns a [`StoreError`]; nothing here
//! swallows a storage failure.

/// Children blob encoding.
pub mod codec;
/// Connection and schema.
pub mod database;
/// Token identity store.
pub mod dictionary;
/// Banned-token rows.
pub mod banned;
/// N-gram transition tables.
pub mod ngrams;

pub use database::Database;
pub use dictionary::Dictionary;
pub use ngrams::{Direction, Order, TransitionStore};

/// Errors raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite reported a failure
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Children blob could not be (de)serialised
    #[error("children codec: {0}")]
    Codec(#[from] bincode::Error),
    /// Variant-forms column could not be (de)serialised
    #[error("variant forms: {0}")]
    Json(#[from] serde_json::Error),
    /// Compression stream failed
    #[error("compression: {0}")]
    Io(#[from] std::io::Error),
    /// Context tuple has the wrong number of ids for its table
    #[error("context of width {got} used with {order:?} (width {expected})")]
    Width {
        /// Order of the table addressed
        order: Order,
        /// Width the table expects
        expected: usize,
        /// Width supplied
        got: usize,
    },
}

/// Shorthand for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
