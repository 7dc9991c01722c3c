#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashSet};

use memory::{Database, Dictionary};
use tokenize::{DictionaryEntry, TokenId};

use crate::Result;

/// Trim and lower-case ban input, dropping blanks.
pub fn normalise(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tokens
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Case-insensitive substring bans for one context.
///
/// Two sources feed it: generic substrings from the language's list, and
/// context-specific bans persisted in `dictionary_banned`. A token is banned
/// when its text contains any of them. The ids of banned dictionary entries
/// are cached so the search can test targets without touching text.
#[derive(Debug, Default)]
pub struct BannedFilter {
    generic: Vec<String>,
    context: BTreeSet<String>,
    ids: HashSet<TokenId>,
}

impl BannedFilter {
    /// Load the persisted bans and compute the banned-id cache.
    pub fn load(db: &Database, dictionary: &Dictionary, generic: &[String]) -> Result<Self> {
        let mut filter = Self {
            generic: normalise(generic),
            context: db.banned_tokens()?.into_iter().collect(),
            ids: HashSet::new(),
        };
        filter.rebuild_ids(dictionary)?;
        log::debug!(
            "banned filter: {} generic, {} context, {} ids",
            filter.generic.len(),
            filter.context.len(),
            filter.ids.len()
        );
        Ok(filter)
    }

    fn substrings(&self) -> impl Iterator<Item = &str> {
        self.generic.iter().chain(self.context.iter()).map(String::as_str)
    }

    fn rebuild_ids(&mut self, dictionary: &Dictionary) -> Result<()> {
        let mut ids = HashSet::new();
        for needle in self.substrings() {
            ids.extend(dictionary.ids_containing(needle)?);
        }
        self.ids = ids;
        Ok(())
    }

    /// True if `text` contains a banned substring, ignoring case.
    pub fn contains_banned(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.substrings().any(|needle| text.contains(needle))
    }

    /// Learning gate: lines with banned content are skipped.
    pub fn is_allowed(&self, text: &str) -> bool {
        !self.contains_banned(text)
    }

    /// True if the entry behind `id` is banned.
    pub fn is_id_banned(&self, id: TokenId) -> bool {
        self.ids.contains(&id)
    }

    /// Register entries created or updated by learning.
    pub fn note_entries(&mut self, entries: &[DictionaryEntry]) {
        for entry in entries {
            if self.contains_banned(&entry.base) {
                self.ids.insert(entry.id);
            }
        }
    }

    /// Context-specific bans, sorted.
    pub fn context_bans(&self) -> impl Iterator<Item = &str> {
        self.context.iter().map(String::as_str)
    }

    /// Persist new bans and refresh the id cache. Repeats are harmless.
    pub fn ban(&mut self, db: &Database, dictionary: &Dictionary, tokens: &[String]) -> Result<()> {
        let tokens = normalise(tokens);
        db.ban_tokens(&tokens)?;
        self.context.extend(tokens);
        self.rebuild_ids(dictionary)
    }

    /// Drop bans and refresh the id cache. Unknown tokens are ignored.
    pub fn unban(&mut self, db: &Database, dictionary: &Dictionary, tokens: &[String]) -> Result<()> {
        let tokens = normalise(tokens);
        db.unban_tokens(&tokens)?;
        for token in &tokens {
            self.context.remove(token);
        }
        self.rebuild_ids(dictionary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tokenize::ParsedToken;

    fn setup(words: &[&str]) -> Result<(Arc<Database>, Dictionary)> {
        let db = Arc::new(Database::open_in_memory()?);
        let mut dict = Dictionary::load(Arc::clone(&db))?;
        let tokens: Vec<ParsedToken> = words.iter().map(|w| ParsedToken::plain(w)).collect();
        dict.learn(&tokens, 100, 2)?;
        Ok((db, dict))
    }

    #[test]
    fn substring_bans_catch_longer_words() -> Result<()> {
        let (db, dict) = setup(&["badger", "good"])?;
        let mut filter = BannedFilter::load(&db, &dict, &[])?;
        filter.ban(&db, &dict, &["  BAD ".to_string()])?;
        assert!(filter.contains_banned("badger"));
        assert!(filter.contains_banned("Honey BADGER"));
        assert!(!filter.contains_banned("good"));
        let badger = dict.resolve(&["badger"])?.get("badger").map(|e| e.id).unwrap_or_default();
        let good = dict.resolve(&["good"])?.get("good").map(|e| e.id).unwrap_or_default();
        assert!(filter.is_id_banned(badger));
        assert!(!filter.is_id_banned(good));
        Ok(())
    }

    #[test]
    fn bans_persist_and_unban_is_idempotent() -> Result<()> {
        let (db, dict) = setup(&["spammer"])?;
        let mut filter = BannedFilter::load(&db, &dict, &[])?;
        filter.ban(&db, &dict, &["spam".to_string()])?;
        filter.ban(&db, &dict, &["spam".to_string()])?;

        let mut reloaded = BannedFilter::load(&db, &dict, &[])?;
        assert_eq!(reloaded.context_bans().collect::<Vec<_>>(), vec!["spam"]);
        assert!(reloaded.is_id_banned(dict.next_id() - 1));

        reloaded.unban(&db, &dict, &["spam".to_string(), "never-banned".to_string()])?;
        reloaded.unban(&db, &dict, &["spam".to_string()])?;
        assert!(!reloaded.contains_banned("spammer"));
        assert!(!reloaded.is_id_banned(dict.next_id() - 1));
        Ok(())
    }

    #[test]
    fn generic_list_applies_and_new_entries_are_noted() -> Result<()> {
        let (db, mut dict) = setup(&[])?;
        let mut filter = BannedFilter::load(&db, &dict, &["heck".to_string()])?;
        assert!(!filter.is_allowed("what the heck"));
        let learned = dict.learn(&[ParsedToken::plain("hecking")], 100, 2)?;
        filter.note_entries(&learned);
        assert!(learned.iter().all(|e| filter.is_id_banned(e.id)));
        Ok(())
    }

    proptest! {
        #[test]
        fn any_text_containing_a_ban_is_caught(prefix in "[a-z]{0,6}", suffix in "[a-z]{0,6}") {
            let filter = BannedFilter { generic: vec!["zzq".to_string()], ..BannedFilter::default() };
            let text = format!("{}ZZQ{}", prefix, suffix);
            prop_assert!(filter.contains_banned(&text));
            prop_assert_eq!(filter.contains_banned(&format!("{}{}", prefix, suffix)), format!("{}{}", prefix, suffix).contains("zzq"));
        }
    }
}
