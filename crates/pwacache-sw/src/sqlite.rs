//! SQLite-backed persistent cache storage.

use crate::store::CacheBackend;
use async_trait::async_trait;
use pwacache_common::{CacheError, Result, ResultExt};
use pwacache_core::types::now_millis;
use pwacache_core::{CachedEntry, RequestKey};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Persistent backend storing every named cache in one SQLite database.
///
/// Statements run inline on the calling task. Each one is a single short
/// query on a local file, so the lock is never held across an `.await`.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening cache database");
        let conn = Connection::open(path).storage_context("failed to open cache database")?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().storage_context("failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .storage_context("failed to enable foreign keys")?;

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .storage_context("failed to read schema version")?;

        if version < SCHEMA_VERSION {
            create_schema_v1(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::storage("cache database connection poisoned"))
    }
}

fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS caches (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS entries (
            cache TEXT NOT NULL REFERENCES caches(name) ON DELETE CASCADE,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            response_url TEXT NOT NULL,
            status INTEGER NOT NULL,
            status_text TEXT NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            cached_at INTEGER NOT NULL,
            PRIMARY KEY (cache, method, url)
        );
        PRAGMA user_version = 1;",
    )
    .storage_context("failed to create cache schema")
}

fn ensure_cache(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![name, now_millis() as i64],
    )
    .storage_context("failed to create cache")?;
    Ok(())
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn open(&self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        ensure_cache(&conn, name)
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT response_url, status, status_text, headers, body, cached_at
                 FROM entries WHERE cache = ?1 AND method = ?2 AND url = ?3",
                params![name, key.method, key.url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()
            .storage_context("failed to read cache entry")?;

        let Some((url, status, status_text, headers, body, cached_at)) = row else {
            return Ok(None);
        };

        let status = u16::try_from(status).storage_context("stored status out of range")?;
        let headers: Vec<(String, String)> =
            serde_json::from_str(&headers).storage_context("stored headers are not valid JSON")?;

        Ok(Some(CachedEntry {
            url,
            status,
            status_text,
            headers,
            body,
            cached_at: cached_at.max(0) as u64,
        }))
    }

    async fn put(&self, name: &str, key: RequestKey, entry: CachedEntry) -> Result<()> {
        let headers =
            serde_json::to_string(&entry.headers).storage_context("failed to encode headers")?;

        let conn = self.conn()?;
        ensure_cache(&conn, name)?;
        conn.execute(
            "INSERT OR REPLACE INTO entries
                (cache, method, url, response_url, status, status_text, headers, body, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                name,
                key.method,
                key.url,
                entry.url,
                entry.status,
                entry.status_text,
                headers,
                entry.body,
                entry.cached_at as i64,
            ],
        )
        .storage_context("failed to write cache entry")?;
        Ok(())
    }

    async fn names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM caches ORDER BY name")
            .storage_context("failed to list caches")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .storage_context("failed to list caches")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage_context("failed to list caches")?;
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM caches WHERE name = ?1", params![name])
            .storage_context("failed to delete cache")?;
        Ok(removed > 0)
    }

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT method, url FROM entries WHERE cache = ?1 ORDER BY method, url")
            .storage_context("failed to list cache keys")?;
        let keys = stmt
            .query_map(params![name], |row| {
                Ok(RequestKey {
                    method: row.get(0)?,
                    url: row.get(1)?,
                })
            })
            .storage_context("failed to list cache keys")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage_context("failed to list cache keys")?;
        Ok(keys)
    }
}
