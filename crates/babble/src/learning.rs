#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};

use memory::{Dictionary, Direction, Order, TransitionStore};
use sampler::Transitions;
use tokenize::ids::fixed_id;
use tokenize::{ParsedToken, TokenId, BOUNDARY_ID};

use crate::banned::BannedFilter;
use crate::config::ContextConfig;
use crate::{EngineError, Result};

/// Every `(context, target)` pair one sentence contributes to a table of
/// context width `width`, with the boundary added at both ends.
///
/// `sequence` is in walk order: reverse tables are fed the reversed
/// sentence. Nothing is produced for sentences shorter than `width`.
pub fn observations(sequence: &[TokenId], width: usize) -> Vec<(Vec<TokenId>, TokenId)> {
    if width == 0 || sequence.len() < width {
        return Vec::new();
    }
    let mut padded = Vec::with_capacity(sequence.len() + 2);
    padded.push(BOUNDARY_ID);
    padded.extend_from_slice(sequence);
    padded.push(BOUNDARY_ID);
    padded
        .windows(width + 1)
        .filter_map(|w| w.split_last().map(|(target, context)| (context.to_vec(), *target)))
        .collect()
}

/// Learn one parsed line.
///
/// Returns `Ok(false)` when the line is too short or holds only
/// punctuation and symbols. Each order and direction is written as its own
/// transaction; a failure stops the call but keeps what was already
/// committed.
pub fn learn(
    dictionary: &mut Dictionary,
    banned: &mut BannedFilter,
    store: &TransitionStore,
    config: &ContextConfig,
    tokens: &[ParsedToken],
) -> Result<bool> {
    let learning = &config.learning;
    if tokens.len() < learning.min_token_count {
        return Ok(false);
    }

    let words: Vec<ParsedToken> = tokens.iter().filter(|t| fixed_id(&t.base).is_none()).cloned().collect();
    if words.is_empty() {
        return Ok(false);
    }

    let entries = dictionary.learn(&words, learning.rescale_threshold, learning.rescale_decimator)?;
    banned.note_entries(&entries);
    let ids: HashMap<&str, TokenId> = entries.iter().map(|e| (e.base.as_str(), e.id)).collect();

    let mut sequence = Vec::with_capacity(tokens.len());
    for token in tokens {
        let id = fixed_id(&token.base).or_else(|| ids.get(token.base.as_str()).copied());
        match id {
            Some(id) => sequence.push(id),
            None => return Err(EngineError::Inconsistent(format!("no id bound to {:?}", token.base))),
        }
    }

    let oldest = config.oldest_allowed(sampler::now());
    for order in config.ngrams.enabled() {
        for direction in Direction::BOTH {
            let walk: Vec<TokenId> = match direction {
                Direction::Forward => sequence.clone(),
                Direction::Reverse => sequence.iter().rev().copied().collect(),
            };
            learn_order(store, order, direction, &walk, oldest, config)?;
        }
    }
    log::debug!("learned {} tokens ({} words)", sequence.len(), entries.len());
    Ok(true)
}

fn learn_order(
    store: &TransitionStore,
    order: Order,
    direction: Direction,
    sequence: &[TokenId],
    oldest: i64,
    config: &ContextConfig,
) -> Result<()> {
    let pairs = observations(sequence, order.width());
    if pairs.is_empty() {
        return Ok(());
    }
    let contexts: Vec<Vec<TokenId>> = pairs.iter().map(|(c, _)| c.clone()).collect();
    let mut batch: BTreeMap<Vec<TokenId>, Transitions> = store.get(order, direction, &contexts, oldest)?;
    for (context, target) in pairs {
        batch.entry(context).or_default().increment(target);
    }
    store.set(
        order,
        direction,
        &mut batch,
        config.learning.rescale_threshold,
        config.learning.rescale_decimator,
    )?;
    Ok(())
}
