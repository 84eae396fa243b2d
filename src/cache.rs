use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Read-through response cache, keyed per URL.
pub trait PageCache: Send + Sync {
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, url: &str, body: &[u8]) -> Result<()>;
    /// Drop every entry, returning how many were removed.
    fn clear(&self) -> Result<usize>;
}

/// SQLite-backed cache persisted between runs.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create cache directory {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("cannot open cache at {}", path.display()))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS responses (
                url        TEXT PRIMARY KEY,
                body       BLOB NOT NULL,
                fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("cache connection poisoned"))
    }
}

impl PageCache for SqliteCache {
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let body = conn
            .query_row(
                "SELECT body FROM responses WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn put(&self, url: &str, body: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (url, body, fetched_at)
             VALUES (?1, ?2, datetime('now'))",
            params![url, body],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM responses", [])?)
    }
}

/// Process-local cache, mostly for tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for MemoryCache {
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| anyhow!("cache lock poisoned"))?;
        Ok(entries.get(url).cloned())
    }

    fn put(&self, url: &str, body: &[u8]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| anyhow!("cache lock poisoned"))?;
        entries.insert(url.to_string(), body.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().map_err(|_| anyhow!("cache lock poisoned"))?;
        let n = entries.len();
        entries.clear();
        Ok(n)
    }
}

/// Cache that never stores anything.
pub struct NoCache;

impl PageCache for NoCache {
    fn get(&self, _url: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _url: &str, _body: &[u8]) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<usize> {
        Ok(0)
    }
}
