#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rusqlite::{params_from_iter, types::Value, Connection};
use sampler::Transitions;
use tokenize::{TokenId, BOUNDARY_ID};

use crate::codec::{decode_children, encode_children};
use crate::{Database, Result, StoreError};

/// Prime modulus for the seeded rowid permutation used when sampling.
const SAMPLE_MODULUS: i64 = 2_147_483_629;

/// N-gram order: the context width plus the one target token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Order {
    /// One-token context
    Digram,
    /// Two-token context
    Trigram,
    /// Three-token context
    Quadgram,
    /// Four-token context
    Quintgram,
}

impl Order {
    /// Every order, lowest first.
    pub const ALL: [Order; 4] = [Order::Digram, Order::Trigram, Order::Quadgram, Order::Quintgram];

    /// Number of ids in a context key.
    pub fn width(self) -> usize {
        match self {
            Order::Digram => 1,
            Order::Trigram => 2,
            Order::Quadgram => 3,
            Order::Quintgram => 4,
        }
    }

    /// Tokens per n-gram (context plus target).
    pub fn n(self) -> usize {
        self.width() + 1
    }

    /// Table holding this order in `direction`.
    pub fn table(self, direction: Direction) -> String {
        format!("ngram_{}_{}", self.n(), direction.name())
    }
}

/// Reading direction of a table.
///
/// A reverse table is a forward table over the reversed sentence, so its
/// contexts are also stored in walk order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Left to right
    Forward,
    /// Right to left
    Reverse,
}

impl Direction {
    /// Both directions, forward first.
    pub const BOTH: [Direction; 2] = [Direction::Forward, Direction::Reverse];

    /// Name used in table names.
    pub fn name(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    /// The other direction.
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// A context key paired with its surviving successors.
pub type ContextEntry = (Vec<TokenId>, Transitions);

fn check_width(order: Order, context: &[TokenId]) -> Result<()> {
    if context.len() == order.width() {
        Ok(())
    } else {
        Err(StoreError::Width { order, expected: order.width(), got: context.len() })
    }
}

fn where_clause(width: usize) -> String {
    (0..width)
        .map(|i| format!("id_{i} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn id_columns(width: usize) -> String {
    (0..width).map(|i| format!("id_{i}")).collect::<Vec<_>>().join(", ")
}

/// Decode a stored blob and keep only fresh edges. A blob that will not
/// decode is logged and read as empty; the next write replaces it.
fn fresh_children(table: &str, blob: &[u8], oldest_allowed: i64) -> Transitions {
    match decode_children(blob) {
        Ok(mut children) => {
            children.retain_newer_than(oldest_allowed);
            children
        }
        Err(e) => {
            log::warn!("discarding unreadable children in {}: {}", table, e);
            Transitions::new()
        }
    }
}

/// Forward and reverse transition tables for every order.
#[derive(Clone)]
pub struct TransitionStore {
    db: Arc<Database>,
}

impl TransitionStore {
    /// Wrap a database handle.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Successors of each context, keeping only edges observed at or after
    /// `oldest_allowed`. Contexts with nothing left are absent.
    pub fn get(
        &self,
        order: Order,
        direction: Direction,
        contexts: &[Vec<TokenId>],
        oldest_allowed: i64,
    ) -> Result<BTreeMap<Vec<TokenId>, Transitions>> {
        let table = order.table(direction);
        let sql = format!("SELECT children FROM {} WHERE {}", table, where_clause(order.width()));
        self.db.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut found = BTreeMap::new();
            for context in contexts {
                check_width(order, context)?;
                if found.contains_key(context) {
                    continue;
                }
                let mut rows = stmt.query(params_from_iter(context.iter()))?;
                if let Some(row) = rows.next()? {
                    let blob: Vec<u8> = row.get(0)?;
                    let children = fresh_children(&table, &blob, oldest_allowed);
                    if !children.is_empty() {
                        found.insert(context.clone(), children);
                    }
                }
            }
            Ok(found)
        })
    }

    /// Up to `count` contexts whose first id is `first`, sampled in a
    /// permuted order seeded from `rng` instead of a full scan.
    pub fn get_by_first<R: Rng + ?Sized>(
        &self,
        order: Order,
        direction: Direction,
        first: TokenId,
        count: usize,
        oldest_allowed: i64,
        rng: &mut R,
    ) -> Result<Vec<ContextEntry>> {
        self.db.read(|conn| sample(conn, order, direction, &[first], count, oldest_allowed, rng))
    }

    /// Up to `count` contexts that open with the boundary followed by
    /// `second`: learned sentence starts (forward) or ends (reverse).
    /// A one-token context cannot hold both, so digrams yield nothing.
    pub fn get_from_boundary<R: Rng + ?Sized>(
        &self,
        order: Order,
        direction: Direction,
        second: TokenId,
        count: usize,
        oldest_allowed: i64,
        rng: &mut R,
    ) -> Result<Vec<ContextEntry>> {
        if order.width() < 2 {
            return Ok(Vec::new());
        }
        self.db.read(|conn| sample(conn, order, direction, &[BOUNDARY_ID, second], count, oldest_allowed, rng))
    }

    /// Rescale and write a batch in one transaction. Contexts whose map is
    /// empty after rescaling are deleted rather than stored.
    pub fn set(
        &self,
        order: Order,
        direction: Direction,
        edges: &mut BTreeMap<Vec<TokenId>, Transitions>,
        rescale_threshold: u32,
        rescale_decimator: u32,
    ) -> Result<()> {
        let table = order.table(direction);
        let width = order.width();
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        {
            let placeholders = (1..=width + 1).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            let mut upsert = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {} ({}, children) VALUES ({})",
                table,
                id_columns(width),
                placeholders
            ))?;
            let mut delete = tx.prepare_cached(&format!("DELETE FROM {} WHERE {}", table, where_clause(width)))?;
            for (context, children) in edges.iter_mut() {
                check_width(order, context)?;
                children.rescale(rescale_threshold, rescale_decimator);
                let mut values: Vec<Value> = context.iter().map(|id| Value::Integer(i64::from(*id))).collect();
                if children.is_empty() {
                    delete.execute(params_from_iter(values.iter()))?;
                } else {
                    values.push(Value::Blob(encode_children(children)?));
                    upsert.execute(params_from_iter(values.iter()))?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn sample<R: Rng + ?Sized>(
    conn: &Connection,
    order: Order,
    direction: Direction,
    prefix: &[TokenId],
    count: usize,
    oldest_allowed: i64,
    rng: &mut R,
) -> Result<Vec<ContextEntry>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let width = order.width();
    let table = order.table(direction);
    let n = prefix.len();
    let sql = format!(
        "SELECT {}, children FROM {} WHERE {} ORDER BY ((rowid * ?{}) + ?{}) % {} LIMIT ?{}",
        id_columns(width),
        table,
        where_clause(n),
        n + 1,
        n + 2,
        SAMPLE_MODULUS,
        n + 3
    );
    let multiplier: i64 = rng.gen_range(1..SAMPLE_MODULUS);
    let offset: i64 = rng.gen_range(0..SAMPLE_MODULUS);
    let mut values: Vec<Value> = prefix.iter().map(|id| Value::Integer(i64::from(*id))).collect();
    values.push(Value::Integer(multiplier));
    values.push(Value::Integer(offset));
    values.push(Value::Integer(i64::try_from(count).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut context = Vec::with_capacity(width);
        for i in 0..width {
            context.push(row.get::<_, TokenId>(i)?);
        }
        let blob: Vec<u8> = row.get(width)?;
        let children = fresh_children(&table, &blob, oldest_allowed);
        if !children.is_empty() {
            out.push((context, children));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn store() -> Result<TransitionStore> {
        Ok(TransitionStore::new(Arc::new(Database::open_in_memory()?)))
    }

    fn edges(entries: &[(&[TokenId], &[(TokenId, i64)])]) -> BTreeMap<Vec<TokenId>, Transitions> {
        entries
            .iter()
            .map(|(ctx, targets)| {
                let mut t = Transitions::new();
                for (target, at) in targets.iter() {
                    t.increment_at(*target, *at);
                }
                (ctx.to_vec(), t)
            })
            .collect()
    }

    #[test]
    fn set_then_get_with_age_filter() -> Result<()> {
        let store = store()?;
        let mut batch = BTreeMap::new();
        let mut t = Transitions::new();
        t.increment_at(5, 100);
        t.increment_at(6, 300);
        batch.insert(vec![1, 2], t);
        store.set(Order::Trigram, Direction::Forward, &mut batch, 1000, 2)?;

        let all = store.get(Order::Trigram, Direction::Forward, &[vec![1, 2], vec![9, 9]], 0)?;
        assert_eq!(all.len(), 1);
        assert_eq!(all.get(&vec![1, 2]).map(|t| t.len()), Some(2));

        let fresh = store.get(Order::Trigram, Direction::Forward, &[vec![1, 2]], 200)?;
        let kept = fresh.get(&vec![1, 2]).cloned().unwrap_or_default();
        assert!(kept.contains(6) && !kept.contains(5));

        assert!(store.get(Order::Trigram, Direction::Forward, &[vec![1, 2]], 400)?.is_empty());
        assert!(store.get(Order::Trigram, Direction::Reverse, &[vec![1, 2]], 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn emptied_maps_are_deleted() -> Result<()> {
        let store = store()?;
        let mut batch = BTreeMap::new();
        let mut t = Transitions::new();
        t.increment_at(5, 1);
        batch.insert(vec![1], t.clone());
        store.set(Order::Digram, Direction::Forward, &mut batch, 10, 2)?;
        assert_eq!(store.get(Order::Digram, Direction::Forward, &[vec![1]], 0)?.len(), 1);

        // one edge over threshold, the other decimates to zero
        for _ in 0..10 {
            t.increment_at(6, 1);
        }
        t.increment_at(6, 1);
        batch.insert(vec![1], t);
        store.set(Order::Digram, Direction::Forward, &mut batch, 10, 20)?;
        assert!(store.get(Order::Digram, Direction::Forward, &[vec![1]], 0)?.is_empty());
        let rows: i64 = store.db.conn().query_row("SELECT COUNT(*) FROM ngram_2_forward", [], |r| r.get(0))?;
        assert_eq!(rows, 0);
        Ok(())
    }

    #[test]
    fn wrong_width_is_rejected() -> Result<()> {
        let store = store()?;
        let err = store.get(Order::Quintgram, Direction::Forward, &[vec![1, 2]], 0);
        assert!(matches!(err, Err(StoreError::Width { expected: 4, got: 2, .. })));
        Ok(())
    }

    #[test]
    fn sampling_by_first_and_from_boundary() -> Result<()> {
        let store = store()?;
        let mut batch = edges(&[
            (&[7, 1], &[(2, 5)]),
            (&[7, 3], &[(4, 5)]),
            (&[7, 5], &[(6, 5)]),
            (&[8, 1], &[(2, 5)]),
            (&[BOUNDARY_ID, 7], &[(1, 5)]),
            (&[BOUNDARY_ID, 8], &[(1, 5)]),
        ]);
        store.set(Order::Trigram, Direction::Forward, &mut batch, 1000, 2)?;
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let all = store.get_by_first(Order::Trigram, Direction::Forward, 7, 10, 0, &mut rng)?;
        let mut firsts: Vec<Vec<TokenId>> = all.iter().map(|(c, _)| c.clone()).collect();
        firsts.sort();
        assert_eq!(firsts, vec![vec![7, 1], vec![7, 3], vec![7, 5]]);

        assert_eq!(store.get_by_first(Order::Trigram, Direction::Forward, 7, 2, 0, &mut rng)?.len(), 2);

        let starts = store.get_from_boundary(Order::Trigram, Direction::Forward, 7, 5, 0, &mut rng)?;
        assert_eq!(starts.len(), 1);
        assert_eq!(starts.first().map(|(c, _)| c.clone()), Some(vec![BOUNDARY_ID, 7]));
        assert!(store.get_from_boundary(Order::Digram, Direction::Forward, 7, 5, 0, &mut rng)?.is_empty());
        Ok(())
    }

    #[test]
    fn seeded_sampling_is_reproducible() -> Result<()> {
        let store = store()?;
        let mut batch = edges(&[
            (&[7, 1], &[(2, 1)]),
            (&[7, 2], &[(2, 1)]),
            (&[7, 3], &[(2, 1)]),
            (&[7, 4], &[(2, 1)]),
            (&[7, 5], &[(2, 1)]),
        ]);
        store.set(Order::Trigram, Direction::Reverse, &mut batch, 1000, 2)?;
        let pick = |seed| -> Result<Vec<Vec<TokenId>>> {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Ok(store
                .get_by_first(Order::Trigram, Direction::Reverse, 7, 3, 0, &mut rng)?
                .into_iter()
                .map(|(c, _)| c)
                .collect())
        };
        assert_eq!(pick(11)?, pick(11)?);
        Ok(())
    }
}
