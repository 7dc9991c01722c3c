#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OpenFlags};

use crate::ngrams::{Direction, Order};
use crate::Result;

/// SQLite handle shared by every store of a context.
///
/// Writes go through one connection behind a mutex; a poisoned lock is taken
/// over rather than propagated, since each statement leaves the file
/// consistent. A file-backed database is switched to WAL and also keeps a
/// pool of read-only connections, so concurrent readers do not queue on the
/// writer. In-memory databases cannot be shared and read through the writer.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    readers: Mutex<Vec<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path` and prepare the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("opening database {}", path.display());
        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        log::debug!("journal mode {}", mode);
        Self::prepare(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, used by tests and throwaway contexts.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?, None)
    }

    fn prepare(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        // context columns reference dictionary ids for documentation only;
        // entries are never deleted so nothing is enforced at runtime
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             PRAGMA case_sensitive_like = ON;
             CREATE TABLE IF NOT EXISTS dictionary (
                 representation TEXT NOT NULL UNIQUE,
                 id INTEGER PRIMARY KEY,
                 base_occurrences INTEGER NOT NULL,
                 variant_forms TEXT
             );
             CREATE TABLE IF NOT EXISTS dictionary_banned (
                 representation TEXT PRIMARY KEY
             );",
        )?;
        for order in Order::ALL {
            for direction in Direction::BOTH {
                conn.execute_batch(&ngram_schema(order, direction))?;
            }
        }
        log::debug!("database schema ready");
        Ok(Self { conn: Mutex::new(conn), path, readers: Mutex::new(Vec::new()) })
    }

    /// Exclusive access to the writing connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on a read-only connection of its own. It sees everything
    /// committed before the call.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let Some(path) = &self.path else {
            return f(&self.conn());
        };
        let idle = self.readers.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let conn = match idle {
            Some(conn) => conn,
            None => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.execute_batch("PRAGMA case_sensitive_like = ON;")?;
                log::debug!("opened reader on {}", path.display());
                conn
            }
        };
        let result = f(&conn);
        self.readers.lock().unwrap_or_else(PoisonError::into_inner).push(conn);
        result
    }

    /// Number of idle read-only connections.
    pub fn idle_readers(&self) -> usize {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn ngram_schema(order: Order, direction: Direction) -> String {
    let width = order.width();
    let columns: Vec<String> = (0..width)
        .map(|i| format!("id_{i} INTEGER NOT NULL REFERENCES dictionary(id)"))
        .collect();
    let keys: Vec<String> = (0..width).map(|i| format!("id_{i}")).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
             {columns},
             children BLOB NOT NULL,
             PRIMARY KEY ({keys})
         );",
        table = order.table(direction),
        columns = columns.join(",\n             "),
        keys = keys.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_every_table() -> Result<()> {
        let db = Database::open_in_memory()?;
        let conn = db.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'ngram_%'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(count, 8);
        let like: i64 = conn.query_row("SELECT 'A' LIKE 'a'", [], |row| row.get(0))?;
        assert_eq!(like, 0, "LIKE must be case-sensitive");
        Ok(())
    }

    #[test]
    fn reopening_keeps_schema() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ctx.sqlite3");
        drop(Database::open(&path)?);
        let db = Database::open(&path)?;
        let rows: i64 = db.conn().query_row("SELECT COUNT(*) FROM dictionary", [], |row| row.get(0))?;
        assert_eq!(rows, 0);
        Ok(())
    }

    #[test]
    fn readers_see_commits_and_are_pooled() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(dir.path().join("ctx.sqlite3"))?;
        let count = |conn: &Connection| -> Result<i64> {
            Ok(conn.query_row("SELECT COUNT(*) FROM dictionary_banned", [], |row| row.get(0))?)
        };
        assert_eq!(db.read(count)?, 0);
        assert_eq!(db.idle_readers(), 1);

        db.conn().execute("INSERT INTO dictionary_banned (representation) VALUES ('x')", [])?;
        assert_eq!(db.read(count)?, 1);
        assert_eq!(db.idle_readers(), 1);
        assert!(db.read(|conn| Ok(conn.execute("DELETE FROM dictionary_banned", [])?)).is_err());

        let memory = Database::open_in_memory()?;
        assert_eq!(memory.read(count)?, 0);
        assert_eq!(memory.idle_readers(), 0);
        Ok(())
    }
}
