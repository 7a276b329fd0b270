//! Persistent page cache backed by SQLite.
//!
//! One row per [`PageKey`]: the key string `"<folder>|<file>|<page>"` and the
//! whole [`PageResult`] as JSON. A row is written with a single
//! `INSERT OR REPLACE` once the result is fully assembled, so a record is
//! either absent or complete; an interrupted run never leaves half a page.
//!
//! The pipeline opens the store once per run, reads it before every expensive
//! call and never deletes from it.

use crate::error::DigitiseError;
use crate::page::{PageKey, PageResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Open a SQLite connection with WAL mode and standard pragmas.
fn open_sqlite(path: &Path) -> Result<Connection, rusqlite::Error> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Key → [`PageResult`] store.
///
/// Call [`CacheStore::close`] when done; dropping an unclosed store still
/// closes the connection but skips the WAL checkpoint.
pub struct CacheStore {
    conn: Option<Connection>,
    path: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, DigitiseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DigitiseError::io(parent, e))?;
        }
        let conn = open_sqlite(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS page_cache (
                 key         TEXT PRIMARY KEY,
                 record      TEXT NOT NULL,
                 inserted_at INTEGER
             );",
        )?;
        debug!("Opened page cache at {}", path.display());
        Ok(Self {
            conn: Some(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection, DigitiseError> {
        self.conn
            .as_ref()
            .ok_or_else(|| DigitiseError::Internal("cache store already closed".into()))
    }

    pub fn contains(&self, key: &PageKey) -> Result<bool, DigitiseError> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM page_cache WHERE key = ?1",
                params![key.cache_key()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Look up `key`.
    ///
    /// # Errors
    /// [`DigitiseError::CorruptCacheRecord`] when the row exists but does not
    /// decode to a valid [`PageResult`].
    pub fn get(&self, key: &PageKey) -> Result<Option<PageResult>, DigitiseError> {
        let cache_key = key.cache_key();
        let record: Option<String> = self
            .conn()?
            .query_row(
                "SELECT record FROM page_cache WHERE key = ?1",
                params![cache_key],
                |row| row.get(0),
            )
            .optional()?;

        match record {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                DigitiseError::CorruptCacheRecord {
                    key: cache_key,
                    detail: e.to_string(),
                }
            }),
        }
    }

    /// Store `result` under its key, replacing any previous record.
    pub fn put(&self, result: &PageResult) -> Result<(), DigitiseError> {
        let key = result.key().cache_key();
        let json = serde_json::to_string(result).map_err(|e| DigitiseError::CorruptCacheRecord {
            key: key.clone(),
            detail: format!("serialise: {e}"),
        })?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO page_cache (key, record, inserted_at) VALUES (?1, ?2, ?3)",
            params![key, json, now_epoch()],
        )?;
        debug!("Cached {}", key);
        Ok(())
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, DigitiseError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM page_cache", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, DigitiseError> {
        Ok(self.len()? == 0)
    }

    /// Checkpoint the WAL into the main database file and close.
    pub fn close(mut self) -> Result<(), DigitiseError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        conn.close().map_err(|(_, e)| DigitiseError::Cache(e))?;
        debug!("Closed page cache at {}", self.path.display());
        Ok(())
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!("Closing page cache {} failed: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Dimensions, SourcePage};
    use tempfile::TempDir;

    fn result(seq: u32, french: &str) -> PageResult {
        let source = SourcePage::new(
            seq,
            "part 1.pdf",
            "Journal 1",
            vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9],
            Dimensions {
                width: 10,
                height: 20,
                original_width: 100,
                original_height: 200,
            },
        )
        .unwrap();
        PageResult {
            source,
            french_text: french.into(),
            english_text: String::new(),
            french_markup: None,
            english_markup: None,
        }
    }

    #[test]
    fn put_then_get_returns_record() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(&tmp.path().join("cache.sqlite3")).unwrap();
        let r = result(1, "Monsieur");
        assert!(!store.contains(&r.key()).unwrap());

        store.put(&r).unwrap();
        assert!(store.contains(&r.key()).unwrap());
        assert_eq!(store.get(&r.key()).unwrap(), Some(r));
        store.close().unwrap();
    }

    #[test]
    fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/cache.sqlite3");
        let r = result(4, "Madame");
        {
            let store = CacheStore::open(&path).unwrap();
            store.put(&r).unwrap();
            store.close().unwrap();
        }
        let store = CacheStore::open(&path).unwrap();
        assert_eq!(store.get(&r.key()).unwrap().unwrap().french_text, "Madame");
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn put_replaces_existing_key() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(&tmp.path().join("c.db")).unwrap();
        store.put(&result(2, "old")).unwrap();
        store.put(&result(2, "new")).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(
            store.get(&PageKey::new("Journal 1", "part 1.pdf", 2)).unwrap().unwrap().french_text,
            "new"
        );
    }

    #[test]
    fn corrupt_record_is_reported() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::open(&tmp.path().join("c.db")).unwrap();
        let key = PageKey::new("J", "a.jpg", 1);
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO page_cache (key, record) VALUES (?1, '{\"nope\": 1}')",
                params![key.cache_key()],
            )
            .unwrap();
        assert!(matches!(
            store.get(&key),
            Err(DigitiseError::CorruptCacheRecord { .. })
        ));
    }

    #[test]
    fn drop_without_close_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.db");
        let r = result(3, "Lettre");
        {
            let store = CacheStore::open(&path).unwrap();
            store.put(&r).unwrap();
        }
        let store = CacheStore::open(&path).unwrap();
        assert!(store.contains(&r.key()).unwrap());
    }
}
