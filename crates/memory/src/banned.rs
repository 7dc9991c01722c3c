#![forbid(unsafe_code)]

use rusqlite::params;

use crate::{Database, Result};

impl Database {
    /// Every context-specific banned representation.
    pub fn banned_tokens(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT representation FROM dictionary_banned ORDER BY representation")?;
        let tokens = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tokens)
    }

    /// Persist bans; already banned tokens are left alone.
    pub fn ban_tokens(&self, tokens: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO dictionary_banned (representation) VALUES (?1)")?;
            for token in tokens {
                stmt.execute(params![token])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove bans; unknown tokens are ignored.
    pub fn unban_tokens(&self, tokens: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM dictionary_banned WHERE representation = ?1")?;
            for token in tokens {
                stmt.execute(params![token])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
