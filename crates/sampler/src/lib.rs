#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
#![warn(missing_docs)]
#![deny(unused_must_use)]

//! Transition maps and the sampling strategies used to walk them.
//!
//! A [`Transitions`] value is what one n-gram context knows about its
//! successors: for every target id, how often it followed and when that was
//! last seen. Every order shares this one type; the width of the context is
//! the caller's business.
//!
//! Contract: all randomness comes from the `Rng` passed in, so a seeded
//! generator gives reproducible draws.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokenize::{TokenId, BOUNDARY_ID};

/// Statistics for one edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Times this edge was learned (after rescaling)
    pub occurrences: u32,
    /// UNIX seconds of the last observation
    pub last_observed: i64,
}

/// Current UNIX time in seconds.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Successors of one context, keyed by target id.
///
/// Backed by a `BTreeMap` so iteration (and therefore every seeded draw)
/// is in id order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transitions {
    edges: BTreeMap<TokenId, Transition>,
}

impl Transitions {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True when there are no targets.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edge towards `target`, if any.
    pub fn get(&self, target: TokenId) -> Option<&Transition> {
        self.edges.get(&target)
    }

    /// True if `target` is a known successor.
    pub fn contains(&self, target: TokenId) -> bool {
        self.edges.contains_key(&target)
    }

    /// Edges in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &Transition)> {
        self.edges.iter().map(|(id, t)| (*id, t))
    }

    /// Insert or replace an edge as-is.
    pub fn insert(&mut self, target: TokenId, transition: Transition) {
        self.edges.insert(target, transition);
    }

    /// Count one more observation of `target` at the current time.
    pub fn increment(&mut self, target: TokenId) {
        self.increment_at(target, now());
    }

    /// Count one more observation of `target` at `timestamp`.
    pub fn increment_at(&mut self, target: TokenId, timestamp: i64) {
        let edge = self.edges.entry(target).or_default();
        edge.occurrences = edge.occurrences.saturating_add(1);
        edge.last_observed = timestamp;
    }

    /// Drop edges last seen before `oldest_allowed`.
    pub fn retain_newer_than(&mut self, oldest_allowed: i64) {
        self.edges.retain(|_, t| t.last_observed >= oldest_allowed);
    }

    /// Once any counter exceeds `threshold`, divide all of them by
    /// `decimator` and drop those that reach zero. Returns whether a rescale
    /// happened.
    pub fn rescale(&mut self, threshold: u32, decimator: u32) -> bool {
        if decimator == 0 || !self.edges.values().any(|t| t.occurrences > threshold) {
            return false;
        }
        self.edges.retain(|_, t| {
            t.occurrences /= decimator;
            t.occurrences > 0
        });
        true
    }

    /// A context that has been followed by the boundary can end an utterance.
    pub fn is_terminal(&self) -> bool {
        self.edges.contains_key(&BOUNDARY_ID)
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.edges.values().map(|t| u64::from(t.occurrences)).sum()
    }

    /// Draw up to `count` distinct targets, weighted by occurrences, without
    /// replacement.
    ///
    /// Banned targets never qualify; the boundary is skipped when
    /// `exclude_boundary` is set. Stops early once the pool is empty.
    pub fn select_weighted<R, F>(
        &self,
        count: usize,
        is_banned: F,
        exclude_boundary: bool,
        rng: &mut R,
    ) -> Vec<TokenId>
    where
        R: Rng + ?Sized,
        F: Fn(TokenId) -> bool,
    {
        let mut pool: Vec<(TokenId, u64)> = self
            .edges
            .iter()
            .filter(|(id, t)| {
                t.occurrences > 0 && !(exclude_boundary && **id == BOUNDARY_ID) && !is_banned(**id)
            })
            .map(|(id, t)| (*id, u64::from(t.occurrences)))
            .collect();

        let mut picked = Vec::with_capacity(count.min(pool.len()));
        while picked.len() < count && !pool.is_empty() {
            let total: u64 = pool.iter().map(|(_, w)| w).sum();
            let mut roll = rng.gen_range(0..total);
            let mut winner = pool.len() - 1;
            for (i, (_, weight)) in pool.iter().enumerate() {
                if roll < *weight {
                    winner = i;
                    break;
                }
                roll -= weight;
            }
            let (id, _) = pool.swap_remove(winner);
            picked.push(id);
        }
        picked
    }

    /// Targets that are also in `desired`, shuffled, at most `count` of them.
    pub fn select_from_set<R>(&self, desired: &[TokenId], count: usize, rng: &mut R) -> Vec<TokenId>
    where
        R: Rng + ?Sized,
    {
        let mut hits: Vec<TokenId> = self
            .edges
            .keys()
            .copied()
            .filter(|id| desired.contains(id))
            .collect();
        hits.shuffle(rng);
        hits.truncate(count);
        hits
    }

    /// Information content of stepping to `target`: `-log2(p)`.
    ///
    /// Zero when the target is unknown or the map has no weight; a walk may
    /// cross a context that was learned under a different set of orders.
    pub fn surprise(&self, target: TokenId) -> f64 {
        let total = self.total();
        match self.edges.get(&target) {
            Some(t) if total > 0 && t.occurrences > 0 => {
                -(f64::from(t.occurrences) / total as f64).log2()
            }
            _ => 0.0,
        }
    }
}

impl FromIterator<(TokenId, Transition)> for Transitions {
    fn from_iter<I: IntoIterator<Item = (TokenId, Transition)>>(iter: I) -> Self {
        Self { edges: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn map(edges: &[(TokenId, u32)]) -> Transitions {
        edges
            .iter()
            .map(|(id, n)| (*id, Transition { occurrences: *n, last_observed: 100 }))
            .collect()
    }

    #[test]
    fn increment_defaults_and_stamps() {
        let mut t = Transitions::new();
        t.increment_at(5, 10);
        t.increment_at(5, 20);
        t.increment_at(6, 30);
        assert_eq!(t.get(5), Some(&Transition { occurrences: 2, last_observed: 20 }));
        assert_eq!(t.get(6).map(|e| e.occurrences), Some(1));
        let before = now();
        t.increment(7);
        assert!(t.get(7).map(|e| e.last_observed).unwrap_or_default() >= before);
    }

    #[test]
    fn rescale_divides_and_drops() {
        let mut t = map(&[(1, 9), (2, 2), (3, 31)]);
        assert!(t.rescale(30, 3));
        assert_eq!(t, map(&[(1, 3), (3, 10)]));
        assert!(!t.rescale(30, 3));
    }

    #[test]
    fn retain_filters_by_age() {
        let mut t = Transitions::new();
        t.increment_at(1, 50);
        t.increment_at(2, 150);
        t.retain_newer_than(100);
        assert!(!t.contains(1));
        assert!(t.contains(2));
    }

    #[test]
    fn terminal_means_boundary_edge() {
        assert!(map(&[(BOUNDARY_ID, 1), (4, 2)]).is_terminal());
        assert!(!map(&[(4, 2)]).is_terminal());
    }

    #[test]
    fn only_banned_target_yields_nothing() {
        let t = map(&[(9, 5)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(t.select_weighted(3, |id| id == 9, false, &mut rng).is_empty());

        let with_boundary = map(&[(9, 5), (BOUNDARY_ID, 1)]);
        assert_eq!(with_boundary.select_weighted(3, |id| id == 9, false, &mut rng), vec![BOUNDARY_ID]);
        assert!(with_boundary.select_weighted(3, |id| id == 9, true, &mut rng).is_empty());
    }

    #[test]
    fn weighted_draw_follows_weights() {
        let t = map(&[(1, 1000), (2, 1)]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let heavy = (0..200)
            .filter(|_| t.select_weighted(1, |_| false, false, &mut rng) == vec![1])
            .count();
        assert!(heavy > 180, "heavy picked only {} times", heavy);
    }

    #[test]
    fn seeded_draws_repeat() {
        let t = map(&[(1, 3), (2, 4), (3, 5), (4, 6)]);
        let a = t.select_weighted(3, |_| false, false, &mut ChaCha8Rng::seed_from_u64(42));
        let b = t.select_weighted(3, |_| false, false, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn select_from_set_intersects() {
        let t = map(&[(1, 1), (2, 1), (3, 1)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut got = t.select_from_set(&[3, 1, 99], 5, &mut rng);
        got.sort_unstable();
        assert_eq!(got, vec![1, 3]);
        assert_eq!(t.select_from_set(&[1, 2, 3], 1, &mut rng).len(), 1);
        assert!(t.select_from_set(&[42], 2, &mut rng).is_empty());
    }

    #[test]
    fn surprise_values() {
        let t = map(&[(1, 1), (2, 3)]);
        assert!((t.surprise(2) - 0.415_037_499).abs() < 1e-6);
        assert!((t.surprise(1) - 2.0).abs() < 1e-12);
        assert_eq!(t.surprise(77), 0.0);
        assert_eq!(Transitions::new().surprise(1), 0.0);
    }

    quickcheck::quickcheck! {
        fn surprise_is_never_negative(counts: Vec<(i32, u16)>, target: i32) -> bool {
            let t: Transitions = counts
                .into_iter()
                .map(|(id, n)| (id, Transition { occurrences: u32::from(n), last_observed: 0 }))
                .collect();
            let s = t.surprise(target);
            s >= 0.0 && s.is_finite()
        }
    }

    proptest! {
        #[test]
        fn weighted_picks_are_distinct_and_allowed(
            counts in proptest::collection::btree_map(-50i32..50, 1u32..100, 0..20),
            count in 0usize..25,
            seed in any::<u64>(),
        ) {
            let t: Transitions = counts
                .iter()
                .map(|(id, n)| (*id, Transition { occurrences: *n, last_observed: 0 }))
                .collect();
            let banned = |id: TokenId| id % 3 == 0;
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let picked = t.select_weighted(count, banned, true, &mut rng);
            let eligible = counts.keys().filter(|id| !banned(**id)).count();
            prop_assert_eq!(picked.len(), count.min(eligible));
            let mut seen = std::collections::BTreeSet::new();
            for id in &picked {
                prop_assert!(seen.insert(*id));
                prop_assert!(!banned(*id));
                prop_assert!(t.contains(*id));
            }
        }

        #[test]
        fn rescale_keeps_floor_or_drops(
            counts in proptest::collection::btree_map(0i32..40, 1u32..1000, 1..20),
            decimator in 2u32..8,
        ) {
            let mut t: Transitions = counts
                .iter()
                .map(|(id, n)| (*id, Transition { occurrences: *n, last_observed: 0 }))
                .collect();
            let triggered = t.rescale(500, decimator);
            for (id, old) in counts {
                let expect = if triggered { old / decimator } else { old };
                match t.get(id) {
                    Some(edge) => prop_assert_eq!(edge.occurrences, expect),
                    None => prop_assert_eq!(expect, 0),
                }
            }
        }
    }
}
