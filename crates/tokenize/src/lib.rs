#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
#![warn(missing_docs)]
#![deny(unused_must_use)]

//! Token identities and language front-ends.
//!
//! Layout:
//! - `ids.rs`: the `i32` id space: boundary, punctuation and symbol tables
//! - `dictionary.rs`: `ParsedToken` and `DictionaryEntry` (variant counts, `represent`)
//! - `language.rs`: the `Language` trait (`parse` + `format`) and lookup by name
//! - `english.rs`: English lexer, punctuation dissection and formatter

/// Token id space and the fixed punctuation/symbol tables.
pub mod ids;
/// Parsed tokens and learned dictionary entries.
pub mod dictionary;
/// Language front-end trait.
pub mod language;
/// English rules.
pub mod english;

pub use dictionary::{DictionaryEntry, ParsedToken};
pub use ids::{TokenId, BOUNDARY_ID};
pub use language::{language_for, Language};
