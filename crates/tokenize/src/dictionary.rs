#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::TokenId;

/// One normalised token produced by a language front-end.
///
/// `base` is the lower-cased identity key; `variant` is the surface form as
/// it appeared in the input. For punctuation and symbols both are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParsedToken {
    /// Lower-cased form used as the dictionary key
    pub base: String,
    /// Surface form as typed
    pub variant: String,
}

impl ParsedToken {
    /// Token whose surface form equals its base.
    pub fn plain(repr: &str) -> Self {
        Self { base: repr.to_string(), variant: repr.to_string() }
    }
}

/// A learned token: stable id plus popularity of each surface spelling.
///
/// The base form is never stored in `variants`. Variants live in a `BTreeMap`
/// so that ties in [`DictionaryEntry::represent`] resolve to the
/// lexicographically smallest spelling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Stable identity, never reused
    pub id: TokenId,
    /// Lower-cased representation (unique key)
    pub base: String,
    /// Times the base spelling itself was observed
    pub base_occurrences: u32,
    /// Other spellings and their counts
    pub variants: BTreeMap<String, u32>,
}

impl DictionaryEntry {
    /// Fresh entry with no observations yet.
    pub fn new(id: TokenId, base: &str) -> Self {
        Self { id, base: base.to_string(), ..Self::default() }
    }

    /// Record one sighting of `variant`.
    pub fn observe(&mut self, variant: &str) {
        if variant == self.base {
            self.base_occurrences = self.base_occurrences.saturating_add(1);
        } else {
            let count = self.variants.entry(variant.to_string()).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    /// Divide every variant counter by `decimator` once any exceeds
    /// `threshold`; counters reaching zero are dropped. Returns whether a
    /// rescale happened.
    pub fn rescale(&mut self, threshold: u32, decimator: u32) -> bool {
        if decimator == 0 || !self.variants.values().any(|&c| c > threshold) {
            return false;
        }
        self.variants.retain(|_, count| {
            *count /= decimator;
            *count > 0
        });
        true
    }

    /// All observations, base plus variants.
    pub fn total_occurrences(&self) -> u64 {
        self.variants
            .values()
            .fold(u64::from(self.base_occurrences), |acc, &c| acc + u64::from(c))
    }

    /// Spelling to show for this entry.
    ///
    /// Returns the base form (flagged `true`) when its share of all
    /// observations exceeds `threshold`, otherwise the most observed variant.
    /// An entry without variants always shows its base.
    pub fn represent(&self, threshold: f32) -> (&str, bool) {
        let total = self.total_occurrences();
        if total > 0 && (self.base_occurrences as f64 / total as f64) > f64::from(threshold) {
            return (self.base.as_str(), true);
        }
        let mut best: Option<(&String, u32)> = None;
        for (variant, &count) in &self.variants {
            match best {
                Some((_, top)) if count <= top => {}
                _ => best = Some((variant, count)),
            }
        }
        match best {
            Some((variant, _)) => (variant.as_str(), false),
            None => (self.base.as_str(), true),
        }
    }
}
