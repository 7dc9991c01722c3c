#![forbid(unsafe_code)]

use memory::{Direction, Order, TransitionStore};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use sampler::Transitions;
use tokenize::{TokenId, BOUNDARY_ID};

use crate::banned::BannedFilter;
use crate::config::ContextConfig;
use crate::dedup::dedup;
use crate::Result;

/// Table reads one walk may spend before giving up, on top of `max_length`.
const WALK_BUDGET: usize = 256;

/// Ids in the direction of travel. May open with the boundary when the walk
/// is anchored at a sentence start (forward) or end (reverse).
type Path = Vec<TokenId>;

fn production_length(path: &[TokenId]) -> usize {
    path.iter().filter(|id| **id != BOUNDARY_ID).count()
}

/// Forward-ordered production from a walk-ordered path.
fn to_production(direction: Direction, path: &[TokenId]) -> Vec<TokenId> {
    let words = path.iter().copied().filter(|id| *id != BOUNDARY_ID);
    match direction {
        Direction::Forward => words.collect(),
        Direction::Reverse => {
            let mut out: Vec<TokenId> = words.collect();
            out.reverse();
            out
        }
    }
}

/// Pair every item with its own seed, drawn in order from `rng`, so
/// parallel work stays reproducible whatever the scheduling.
fn seeded<T, R: Rng + ?Sized>(items: Vec<T>, rng: &mut R) -> Vec<(T, u64)> {
    items.into_iter().map(|item| (item, rng.gen())).collect()
}

/// Builds productions for one request.
///
/// Walks are strictly sequential; the pool only runs independent walks
/// side by side, and each phase finishes before the next begins.
pub struct Searcher<'a> {
    store: &'a TransitionStore,
    config: &'a ContextConfig,
    banned: &'a BannedFilter,
    pool: &'a ThreadPool,
    oldest_allowed: i64,
    /// Enabled orders, highest first
    orders: Vec<Order>,
}

impl<'a> Searcher<'a> {
    /// Borrow everything one request needs.
    pub fn new(
        store: &'a TransitionStore,
        config: &'a ContextConfig,
        banned: &'a BannedFilter,
        pool: &'a ThreadPool,
        oldest_allowed: i64,
    ) -> Self {
        let mut orders = config.ngrams.enabled();
        orders.reverse();
        Self { store, config, banned, pool, oldest_allowed, orders }
    }

    fn is_banned(&self, id: TokenId) -> bool {
        self.banned.is_id_banned(id)
    }

    /// Keyword-anchored search: every chosen keyword ends up in the middle
    /// of a sentence built from two half-walks. Duplicates are removed.
    pub fn keyword_search<R: Rng + ?Sized>(&self, keywords: &[TokenId], rng: &mut R) -> Result<Vec<Vec<TokenId>>> {
        let p = &self.config.production;
        let chosen: Vec<TokenId> = keywords.choose_multiple(rng, p.tokens_initial).copied().collect();
        if chosen.is_empty() {
            return Ok(Vec::new());
        }

        let jobs: Vec<(TokenId, Direction)> =
            chosen.iter().flat_map(|k| Direction::BOTH.map(|d| (*k, d))).collect();
        let jobs = seeded(jobs, rng);
        let built: Vec<Vec<(Direction, Path)>> = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|((keyword, direction), seed)| -> Result<Vec<(Direction, Path)>> {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    let fragments = self.fragments(keyword, direction, keywords, &mut rng)?;
                    Ok(fragments.into_iter().map(|f| (direction, f)).collect())
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        for (direction, fragment) in built.into_iter().flatten() {
            match direction {
                Direction::Forward => forward.push(fragment),
                Direction::Reverse => reverse.push(fragment),
            }
        }
        log::debug!("keyword search: {} forward and {} reverse fragments", forward.len(), reverse.len());

        let mut productions = self.pass(Direction::Forward, forward, keywords, rng)?;
        productions.extend(self.pass(Direction::Reverse, reverse, keywords, rng)?);
        Ok(dedup(productions))
    }

    /// Boundary-anchored fallback: generic sentence starts and ends, still
    /// leaning towards `keywords` where a sampled context offers them.
    pub fn boundary_search<R: Rng + ?Sized>(&self, keywords: &[TokenId], rng: &mut R) -> Result<Vec<Vec<TokenId>>> {
        let p = &self.config.production;
        let count = p.search_branches_initial.max(1) * p.tokens_initial.max(1);
        let mut productions = Vec::new();
        for direction in Direction::BOTH {
            let starts = seeded(self.boundary_fragments(direction, keywords, count, rng)?, rng);
            let walked: Vec<Option<Path>> = self.pool.install(|| {
                starts
                    .into_par_iter()
                    .map(|(start, seed)| {
                        let mut rng = ChaCha8Rng::seed_from_u64(seed);
                        self.complete(direction, start, keywords, true, &mut rng)
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            productions.extend(walked.into_iter().flatten().map(|path| to_production(direction, &path)));
        }
        log::debug!("boundary search: {} productions", productions.len());
        Ok(dedup(productions))
    }

    /// Walk every fragment outward in `direction`, then finish each
    /// surviving half with a walk the other way.
    fn pass<R: Rng + ?Sized>(
        &self,
        direction: Direction,
        fragments: Vec<Path>,
        keywords: &[TokenId],
        rng: &mut R,
    ) -> Result<Vec<Vec<TokenId>>> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }
        let fragments = seeded(fragments, rng);
        let halves: Vec<Option<Path>> = self.pool.install(|| {
            fragments
                .into_par_iter()
                .map(|(fragment, seed)| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    // A fragment that already opens at the boundary is
                    // finished by this walk alone.
                    let anchored = fragment.first() == Some(&BOUNDARY_ID);
                    self.complete(direction, fragment, keywords, anchored, &mut rng)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let back = direction.flip();
        let halves = seeded(halves.into_iter().flatten().collect::<Vec<Path>>(), rng);
        let finished: Vec<Option<Path>> = self.pool.install(|| {
            halves
                .into_par_iter()
                .map(|(half, seed)| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    let turned: Path = half.into_iter().rev().collect();
                    if turned.last() == Some(&BOUNDARY_ID) {
                        return Ok(Some(turned));
                    }
                    self.complete(back, turned, keywords, true, &mut rng)
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(finished.into_iter().flatten().map(|path| to_production(back, &path)).collect())
    }

    /// Starting fragments for one keyword in one direction: contexts that
    /// open with it, then contexts where it sits next to the boundary.
    fn fragments<R: Rng + ?Sized>(
        &self,
        keyword: TokenId,
        direction: Direction,
        keywords: &[TokenId],
        rng: &mut R,
    ) -> Result<Vec<Path>> {
        let p = &self.config.production;
        let mut out = Vec::new();

        let mut anchored = 0;
        for &order in &self.orders {
            let want = p.search_branches_initial.saturating_sub(anchored);
            if want == 0 {
                break;
            }
            for (context, children) in
                self.store.get_by_first(order, direction, keyword, want, self.oldest_allowed, rng)?
            {
                if let Some(fragment) = self.extend_fragment(context, &children, keywords, rng) {
                    out.push(fragment);
                    anchored += 1;
                }
            }
        }

        let mut from_boundary = 0;
        for &order in &self.orders {
            let want = p.search_branches_from_boundary_initial.saturating_sub(from_boundary);
            if want == 0 {
                break;
            }
            if order.width() == 1 {
                let starts = self.store.get(order, direction, &[vec![BOUNDARY_ID]], self.oldest_allowed)?;
                if starts.values().any(|t| t.contains(keyword)) {
                    out.push(vec![BOUNDARY_ID, keyword]);
                    from_boundary += 1;
                }
                continue;
            }
            for (context, children) in
                self.store.get_from_boundary(order, direction, keyword, want, self.oldest_allowed, rng)?
            {
                if let Some(fragment) = self.extend_fragment(context, &children, keywords, rng) {
                    out.push(fragment);
                    from_boundary += 1;
                }
            }
        }
        Ok(out)
    }

    /// Sampled sentence starts (forward) or ends (reverse) from the highest
    /// order that has any.
    fn boundary_fragments<R: Rng + ?Sized>(
        &self,
        direction: Direction,
        keywords: &[TokenId],
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Path>> {
        for &order in &self.orders {
            let mut out = Vec::new();
            if order.width() == 1 {
                let starts = self.store.get(order, direction, &[vec![BOUNDARY_ID]], self.oldest_allowed)?;
                if let Some(children) = starts.get([BOUNDARY_ID].as_slice()) {
                    out.extend(
                        self.choose_next(children, keywords, count, rng)
                            .into_iter()
                            .map(|id| vec![BOUNDARY_ID, id]),
                    );
                }
            } else {
                for (context, children) in
                    self.store.get_by_first(order, direction, BOUNDARY_ID, count, self.oldest_allowed, rng)?
                {
                    if let Some(fragment) = self.extend_fragment(context, &children, keywords, rng) {
                        out.push(fragment);
                    }
                }
            }
            if !out.is_empty() {
                return Ok(out);
            }
        }
        Ok(Vec::new())
    }

    /// A sampled context plus one extension. Contexts holding a banned id
    /// are dropped; a terminal context with nothing else to offer is kept
    /// as it is.
    fn extend_fragment<R: Rng + ?Sized>(
        &self,
        mut context: Path,
        children: &Transitions,
        keywords: &[TokenId],
        rng: &mut R,
    ) -> Option<Path> {
        if context.iter().any(|id| self.is_banned(*id)) {
            return None;
        }
        let desired: Vec<TokenId> = keywords.iter().copied().filter(|k| !context.contains(k)).collect();
        match self.choose_next(children, &desired, 1, rng).first() {
            Some(next) => {
                context.push(*next);
                Some(context)
            }
            None if children.is_terminal() => Some(context),
            None => None,
        }
    }

    /// Up to `count` extensions: desired keywords first, then a weighted
    /// fill. Never the boundary, never a banned id.
    fn choose_next<R: Rng + ?Sized>(
        &self,
        children: &Transitions,
        desired: &[TokenId],
        count: usize,
        rng: &mut R,
    ) -> Vec<TokenId> {
        let wanted: Vec<TokenId> = desired.iter().copied().filter(|id| !self.is_banned(*id)).collect();
        let mut picks = children.select_from_set(&wanted, count, rng);
        let fill = count.saturating_sub(picks.len());
        let rest = children.select_weighted(fill, |id| self.is_banned(id) || picks.contains(&id), true, rng);
        picks.extend(rest);
        picks
    }

    /// Walk `path` in `direction` until it stops at a terminus.
    fn complete<R: Rng + ?Sized>(
        &self,
        direction: Direction,
        mut path: Path,
        keywords: &[TokenId],
        enforce_min_length: bool,
        rng: &mut R,
    ) -> Result<Option<Path>> {
        let desired: Vec<TokenId> = keywords.iter().copied().filter(|k| !path.contains(k)).collect();
        let mut budget = WALK_BUDGET;
        if self.walk(direction, &mut path, &desired, enforce_min_length, &mut budget, rng)? {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    /// Successors of the widest context that has any.
    fn successors(&self, direction: Direction, path: &[TokenId]) -> Result<Option<Transitions>> {
        for &order in &self.orders {
            let width = order.width();
            let Some(context) = path.len().checked_sub(width).and_then(|start| path.get(start..)) else {
                continue;
            };
            let mut found = self.store.get(order, direction, &[context.to_vec()], self.oldest_allowed)?;
            if let Some(children) = found.remove(context) {
                return Ok(Some(children));
            }
        }
        Ok(None)
    }

    /// One step of a walk. On success `path` holds the finished walk; on
    /// failure it is left as it was.
    ///
    /// At a terminus the walk may stop (see `ProductionConfig::stop_chance`).
    /// Otherwise the candidate extensions are tried in turn and the first
    /// that finishes wins. If none does, a terminus is still accepted.
    fn walk<R: Rng + ?Sized>(
        &self,
        direction: Direction,
        path: &mut Path,
        desired: &[TokenId],
        enforce_min_length: bool,
        budget: &mut usize,
        rng: &mut R,
    ) -> Result<bool> {
        if *budget == 0 {
            return Ok(false);
        }
        *budget -= 1;

        let Some(children) = self.successors(direction, path)? else {
            return Ok(false);
        };
        let p = &self.config.production;
        let length = production_length(path);
        let may_stop = children.is_terminal() && (!enforce_min_length || length >= p.min_length);
        if may_stop && rng.gen::<f32>() < p.stop_chance(length) {
            return Ok(true);
        }

        if length < p.max_length {
            for next in self.choose_next(&children, desired, p.search_branches_children, rng) {
                let remaining: Vec<TokenId> = desired.iter().copied().filter(|id| *id != next).collect();
                path.push(next);
                if self.walk(direction, path, &remaining, enforce_min_length, budget, rng)? {
                    return Ok(true);
                }
                path.pop();
            }
        }
        Ok(may_stop)
    }
}
