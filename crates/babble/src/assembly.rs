#![forbid(unsafe_code)]

use memory::Dictionary;
use serde::Serialize;
use tokenize::ids::is_reserved;
use tokenize::{Language, TokenId};

use crate::scoring::ScoredProduction;
use crate::Result;

/// One rendered reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Utterance {
    /// Display text
    pub text: String,
    /// Integer score, higher is better
    pub score: i32,
    /// Summed surprise, used to break score ties
    pub surprise: f64,
}

/// Score descending, then surprise descending. Stable, so equal pairs keep
/// the order the search produced them in.
pub fn rank(scored: &mut [ScoredProduction]) {
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.surprise.total_cmp(&a.surprise)));
}

/// Rank and render. Every learned id across the batch is resolved in one
/// lookup; a production that still cannot be rendered is logged and
/// dropped.
pub fn assemble(
    language: &dyn Language,
    dictionary: &Dictionary,
    mut scored: Vec<ScoredProduction>,
    base_representation_threshold: f32,
) -> Result<Vec<Utterance>> {
    rank(&mut scored);

    let mut ids: Vec<TokenId> = scored
        .iter()
        .flat_map(|s| s.tokens.iter().copied())
        .filter(|id| !is_reserved(*id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    let entries = dictionary.resolve_by_id(&ids)?;

    let mut out = Vec::with_capacity(scored.len());
    for production in scored {
        match language.format(&production.tokens, &entries, base_representation_threshold) {
            Some(text) => out.push(Utterance { text, score: production.score, surprise: production.surprise }),
            None => log::warn!("dropping production {:?}: unresolved token", production.tokens),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::Database;
    use std::sync::Arc;
    use tokenize::english::English;
    use tokenize::ids::FIRST_LEARNED_ID;
    use tokenize::ParsedToken;

    fn scored(tokens: Vec<TokenId>, score: i32, surprise: f64) -> ScoredProduction {
        ScoredProduction { tokens, score, surprise }
    }

    #[test]
    fn ranks_by_score_then_surprise() {
        let mut batch = vec![scored(vec![1], 3, 1.0), scored(vec![2], 5, 0.0), scored(vec![3], 3, 2.0)];
        rank(&mut batch);
        let order: Vec<TokenId> = batch.iter().filter_map(|s| s.tokens.first().copied()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn renders_and_drops_unresolvable() -> Result<()> {
        let db = Arc::new(Database::open_in_memory()?);
        let mut dictionary = Dictionary::load(db)?;
        dictionary.learn(&[ParsedToken::plain("hello"), ParsedToken::plain("world")], 1000, 3)?;
        let (hello, world) = (FIRST_LEARNED_ID, FIRST_LEARNED_ID + 1);

        let batch = vec![
            scored(vec![world, hello], 2, 0.5),
            scored(vec![hello, FIRST_LEARNED_ID + 99], 9, 0.0),
            scored(vec![hello, world], 2, 1.5),
        ];
        let out = assemble(&English, &dictionary, batch, 0.75)?;
        let texts: Vec<&str> = out.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello world", "World hello"]);
        assert_eq!(out.first().map(|u| u.score), Some(2));
        Ok(())
    }
}
