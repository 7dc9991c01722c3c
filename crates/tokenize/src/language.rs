#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use crate::dictionary::{DictionaryEntry, ParsedToken};
use crate::ids::TokenId;

/// A language front-end: turns raw text into tokens and productions back
/// into text.
pub trait Language: Send + Sync {
    /// Name used in context configuration files.
    fn name(&self) -> &'static str;

    /// Split `input` into normalised tokens.
    ///
    /// The flag is `false` when the input must not be learned from. With
    /// `learn` set, any invalid token rejects the whole line and no tokens are
    /// returned; otherwise invalid tokens are skipped and the rest is kept for
    /// keyword extraction.
    fn parse(&self, input: &str, learn: bool, max_token_length: usize) -> (Vec<ParsedToken>, bool);

    /// Dictionary key for a single word, as `parse` would derive it.
    fn normalise(&self, word: &str) -> String {
        word.to_lowercase()
    }

    /// Render a production. Returns `None` if an id has no dictionary entry.
    fn format(
        &self,
        production: &[TokenId],
        entries: &HashMap<TokenId, DictionaryEntry>,
        base_representation_threshold: f32,
    ) -> Option<String>;
}

/// Look up a language by its configuration name.
pub fn language_for(name: &str) -> Option<Arc<dyn Language>> {
    match name {
        "english" => Some(Arc::new(crate::english::English)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_is_known() {
        assert_eq!(language_for("english").map(|l| l.name()), Some("english"));
        assert!(language_for("klingon").is_none());
    }
}
