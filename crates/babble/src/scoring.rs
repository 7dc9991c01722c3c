#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};

use memory::{Direction, Order, TransitionStore};
use sampler::Transitions;
use tokenize::ids::{is_punctuation, is_symbol};
use tokenize::{TokenId, BOUNDARY_ID};

use crate::config::ContextConfig;
use crate::learning::observations;
use crate::Result;

/// A production that survived scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredProduction {
    /// Forward-ordered ids, no boundary
    pub tokens: Vec<TokenId>,
    /// Integer desirability, always positive
    pub score: i32,
    /// Tie-break only
    pub surprise: f64,
}

/// Integer score of one production, or `None` when it is not positive.
pub fn score(production: &[TokenId], keywords: &[TokenId], config: &ContextConfig) -> Option<i32> {
    let p = &config.production;
    let mut total: i32 = 0;
    if production.len() < p.min_length {
        total -= 2;
    } else if production.len() >= p.target_min_length {
        total += 1;
    }

    let mut remaining: HashSet<TokenId> = keywords.iter().copied().collect();
    let mut seen = HashSet::with_capacity(production.len());
    for &id in production {
        if remaining.remove(&id) {
            total += 2;
        }
        if !seen.insert(id) {
            total -= 1;
        }
        if is_punctuation(id) {
            total += 1;
        }
        if is_symbol(id) {
            total -= 1;
        }
    }
    (total > 0).then_some(total)
}

/// Sum of step surprises along the production, using the lowest enabled
/// order with the boundary at both ends. Forward and reverse halves are
/// switched by configuration.
pub fn surprise(
    store: &TransitionStore,
    production: &[TokenId],
    config: &ContextConfig,
    oldest_allowed: i64,
) -> Result<f64> {
    let Some(order) = config.ngrams.enabled().into_iter().next() else {
        return Ok(0.0);
    };
    let p = &config.production;
    let mut total = 0.0;
    if p.calculate_surprise_forward {
        total += surprise_along(store, order, Direction::Forward, production, oldest_allowed)?;
    }
    if p.calculate_surprise_reverse {
        let reversed: Vec<TokenId> = production.iter().rev().copied().collect();
        total += surprise_along(store, order, Direction::Reverse, &reversed, oldest_allowed)?;
    }
    Ok(total)
}

fn surprise_along(
    store: &TransitionStore,
    order: Order,
    direction: Direction,
    sequence: &[TokenId],
    oldest_allowed: i64,
) -> Result<f64> {
    let steps = observations(sequence, order.width());
    let contexts: Vec<Vec<TokenId>> = steps.iter().map(|(c, _)| c.clone()).collect();
    let maps: BTreeMap<Vec<TokenId>, Transitions> = store.get(order, direction, &contexts, oldest_allowed)?;
    Ok(steps
        .iter()
        .filter_map(|(context, target)| maps.get(context).map(|t| t.surprise(*target)))
        .sum())
}

/// Score every production, keeping positive ones with their surprise.
pub fn score_all(
    store: &TransitionStore,
    productions: Vec<Vec<TokenId>>,
    keywords: &[TokenId],
    config: &ContextConfig,
    oldest_allowed: i64,
) -> Result<Vec<ScoredProduction>> {
    let mut scored = Vec::with_capacity(productions.len());
    for tokens in productions {
        if tokens.contains(&BOUNDARY_ID) {
            log::warn!("dropping production with an embedded boundary");
            continue;
        }
        let Some(score) = score(&tokens, keywords, config) else {
            continue;
        };
        let surprise = surprise(store, &tokens, config, oldest_allowed)?;
        scored.push(ScoredProduction { tokens, score, surprise });
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::Database;
    use std::sync::Arc;
    use tokenize::ids::{punctuation_id, symbol_id, FIRST_LEARNED_ID};

    const W: TokenId = FIRST_LEARNED_ID;

    fn config() -> ContextConfig {
        let mut config = ContextConfig::default();
        config.production.min_length = 4;
        config.production.target_min_length = 6;
        config
    }

    #[test]
    fn short_plain_production_is_rejected() {
        assert_eq!(score(&[W, W + 1], &[], &config()), None);
        assert_eq!(score(&[W, W + 1, W + 2, W + 3], &[], &config()), None);
    }

    #[test]
    fn keywords_count_once_and_repeats_cost() {
        let c = config();
        assert_eq!(score(&[W, W + 1, W + 2, W + 3], &[W], &c), Some(2));
        assert_eq!(score(&[W, W + 1, W, W + 3], &[W], &c), Some(1));
        let long: Vec<TokenId> = (0..6).map(|i| W + i).collect();
        assert_eq!(score(&long, &[W, W + 5], &c), Some(5));
    }

    #[test]
    fn punctuation_helps_and_symbols_hurt() {
        let c = config();
        let dot = punctuation_id(".").unwrap_or_default();
        let heart = symbol_id("<3").unwrap_or_default();
        assert_eq!(score(&[W, W + 1, W + 2, dot], &[], &c), Some(1));
        assert_eq!(score(&[W, W + 1, W + 2, dot, heart], &[], &c), None);
    }

    #[test]
    fn surprise_is_zero_on_a_single_path_and_positive_with_choice() -> Result<()> {
        let store = TransitionStore::new(Arc::new(Database::open_in_memory()?));
        let mut config = ContextConfig::default();
        config.production.calculate_surprise_reverse = false;

        let mut batch: BTreeMap<Vec<TokenId>, Transitions> = BTreeMap::new();
        for (context, target) in observations(&[W, W + 1], 1) {
            batch.entry(context).or_default().increment(target);
        }
        store.set(Order::Digram, Direction::Forward, &mut batch, 1000, 2)?;
        assert_eq!(surprise(&store, &[W, W + 1], &config, i64::MIN)?, 0.0);

        let mut more: BTreeMap<Vec<TokenId>, Transitions> = store.get(Order::Digram, Direction::Forward, &[vec![W]], i64::MIN)?;
        if let Some(t) = more.get_mut(&vec![W]) {
            t.increment(W + 2);
        }
        store.set(Order::Digram, Direction::Forward, &mut more, 1000, 2)?;
        assert!((surprise(&store, &[W, W + 1], &config, i64::MIN)? - 1.0).abs() < 1e-9);
        Ok(())
    }
}
