#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokenize::ids::FIRST_LEARNED_ID;
use tokenize::{DictionaryEntry, ParsedToken, TokenId};

use crate::{Database, Result};

/// Stay well below SQLite's bound-parameter limit.
const CHUNK: usize = 500;

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<(DictionaryEntry, Option<String>)> {
    let entry = DictionaryEntry {
        base: row.get(0)?,
        id: row.get(1)?,
        base_occurrences: row.get(2)?,
        variants: BTreeMap::new(),
    };
    Ok((entry, row.get(3)?))
}

fn with_variants((mut entry, variants): (DictionaryEntry, Option<String>)) -> Result<DictionaryEntry> {
    if let Some(json) = variants {
        entry.variants = serde_json::from_str(&json)?;
    }
    Ok(entry)
}

/// Token identity store: maps lower-cased token text to stable ids.
///
/// Ids come from an in-memory counter seeded once from the highest stored
/// id, so they only ever grow and are never handed out twice, even when a
/// write fails after allocation.
pub struct Dictionary {
    db: Arc<Database>,
    next_id: TokenId,
}

impl Dictionary {
    /// Attach to `db`, seeding the id counter from storage.
    pub fn load(db: Arc<Database>) -> Result<Self> {
        let max: Option<TokenId> = db
            .conn()
            .query_row("SELECT MAX(id) FROM dictionary", [], |row| row.get(0))
            .optional()?
            .flatten();
        let next_id = max.map_or(FIRST_LEARNED_ID, |m| (m + 1).max(FIRST_LEARNED_ID));
        log::debug!("dictionary loaded; next id {}", next_id);
        Ok(Self { db, next_id })
    }

    /// Id the next new entry will get.
    pub fn next_id(&self) -> TokenId {
        self.next_id
    }

    /// Look entries up by base representation; unknown bases are absent.
    pub fn resolve(&self, bases: &[&str]) -> Result<HashMap<String, DictionaryEntry>> {
        let conn = self.db.conn();
        let mut found = HashMap::with_capacity(bases.len());
        for chunk in bases.chunks(CHUNK) {
            let sql = format!(
                "SELECT representation, id, base_occurrences, variant_forms FROM dictionary WHERE representation IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), entry_from_row)?;
            for row in rows {
                let entry = with_variants(row?)?;
                found.insert(entry.base.clone(), entry);
            }
        }
        Ok(found)
    }

    /// Look entries up by id; unknown ids are absent.
    pub fn resolve_by_id(&self, ids: &[TokenId]) -> Result<HashMap<TokenId, DictionaryEntry>> {
        self.db.read(|conn| {
            let mut found = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(CHUNK) {
                let sql = format!(
                    "SELECT representation, id, base_occurrences, variant_forms FROM dictionary WHERE id IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), entry_from_row)?;
                for row in rows {
                    let entry = with_variants(row?)?;
                    found.insert(entry.id, entry);
                }
            }
            Ok(found)
        })
    }

    /// Ids of every entry whose representation contains `needle`.
    pub fn ids_containing(&self, needle: &str) -> Result<Vec<TokenId>> {
        let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare_cached("SELECT id FROM dictionary WHERE representation LIKE ?1 ESCAPE '\\'")?;
        let ids = stmt
            .query_map(params![format!("%{escaped}%")], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<TokenId>>>()?;
        Ok(ids)
    }

    /// Record observations and persist every touched entry in one
    /// transaction.
    ///
    /// Unknown bases get fresh ids. Each touched entry's variant counters are
    /// rescaled before the write. Returns the updated entries in order of
    /// first appearance.
    pub fn learn(
        &mut self,
        observations: &[ParsedToken],
        rescale_threshold: u32,
        rescale_decimator: u32,
    ) -> Result<Vec<DictionaryEntry>> {
        let mut order: Vec<&str> = Vec::new();
        for token in observations {
            if !order.contains(&token.base.as_str()) {
                order.push(&token.base);
            }
        }
        let mut known = self.resolve(&order)?;
        for base in &order {
            if !known.contains_key(*base) {
                known.insert(base.to_string(), DictionaryEntry::new(self.next_id, base));
                self.next_id += 1;
            }
        }
        for token in observations {
            if let Some(entry) = known.get_mut(&token.base) {
                entry.observe(&token.variant);
            }
        }

        let mut updated = Vec::with_capacity(order.len());
        for base in order {
            if let Some(mut entry) = known.remove(base) {
                entry.rescale(rescale_threshold, rescale_decimator);
                updated.push(entry);
            }
        }
        self.save(&updated)?;
        Ok(updated)
    }

    fn save(&self, entries: &[DictionaryEntry]) -> Result<()> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO dictionary (representation, id, base_occurrences, variant_forms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     base_occurrences = excluded.base_occurrences,
                     variant_forms = excluded.variant_forms",
            )?;
            for entry in entries {
                let variants = if entry.variants.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&entry.variants)?)
                };
                stmt.execute(params![entry.base, entry.id, entry.base_occurrences, variants])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
