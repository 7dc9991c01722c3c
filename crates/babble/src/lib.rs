#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
#![warn(missing_docs)]
#![deny(unused_must_use)]

//! babble: a persistent, learning Markov-chain text generator.
//!
//! A [`Context`] owns a dictionary, a banned-token filter and forward/reverse
//! transition tables for orders 2..=5, all kept in one SQLite file. Learning
//! feeds sentences in; speaking walks the tables outward from keywords,
//! scores the candidate sentences and renders the best ones.
//!
//! Layout (important files):
//! - `config.rs`: per-context JSON settings
//! - `banned.rs`: substring bans and the banned-id cache
//! - `learning.rs`: turns a token sequence into n-gram increments
//! - `search.rs`: keyword-anchored and boundary-anchored walks on a rayon pool
//! - `dedup.rs`: prefix tree used to drop repeated productions
//! - `scoring.rs`: integer score and surprise tie-break
//! - `assembly.rs`: ranking and rendering
//! - `context.rs`: the locked, user-facing `Context`
//! - `manager.rs`: loads contexts and word lists from a data directory
//! - `bin/chat.rs`: REPL over one context

use memory::StoreError;

/// Per-context configuration.
pub mod config;
/// Banned-token filter.
pub mod banned;
/// Learning pipeline.
pub mod learning;
/// Production search.
pub mod search;
/// Exact-sequence deduplication.
pub mod dedup;
/// Production scoring.
pub mod scoring;
/// Ranking and rendering.
pub mod assembly;
/// The modelling unit.
pub mod context;
/// Context loading from disk.
pub mod manager;

pub use assembly::Utterance;
pub use config::ContextConfig;
pub use context::Context;
pub use manager::ContextManager;

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The store failed; the current call was aborted
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Configuration names a language with no front-end
    #[error("unknown language {0:?}")]
    UnknownLanguage(String),
    /// A banned or boring list is missing for the context's language
    #[error("no {kind} list for language {language:?}")]
    MissingWordList {
        /// Language the list was looked up for
        language: String,
        /// `"banned"` or `"boring"`
        kind: &'static str,
    },
    /// Configuration values are out of range
    #[error("invalid context configuration: {0}")]
    InvalidConfig(String),
    /// Configuration file is not valid JSON for a context
    #[error("context configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Reading configuration or word lists failed
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Context ids double as file names
    #[error("invalid context id {0:?}")]
    InvalidContextId(String),
    /// The search pool could not be started
    #[error("search pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// A stored reference points at nothing
    #[error("inconsistent model: {0}")]
    Inconsistent(String),
    /// A request panicked and was stopped at the context boundary
    #[error("request aborted: {0}")]
    Fault(String),
}

/// Shorthand for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
