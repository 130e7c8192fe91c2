//! Persistent session-token cache.
//!
//! Tokens live in a process-local map backed by a SQLite file so that a new
//! run can reuse a still-valid session instead of asking for the password
//! again. Losing the file only costs that convenience, so every disk
//! failure degrades the store to memory-only instead of propagating.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};

use crate::session::SessionKey;

/// One persisted session row. Primary key is `(username, base_url)`.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct SessionRecord {
    pub username: String,
    pub base_url: String,
    pub session_id: String,
    pub updated_at: NaiveDateTime,
}

/// Keyed token cache with a write-through SQLite backend.
///
/// The in-memory map is the fast path and is lazily filled from disk, one
/// key per run. Anonymous sessions (empty username) stay in memory for the
/// process lifetime and never touch the file.
pub struct SessionStore {
    cache: HashMap<SessionKey, String>,
    probed: HashSet<SessionKey>,
    pool: Option<Pool<Sqlite>>,
}

impl SessionStore {
    /// Open the cache at `path`, or a memory-only store when `enabled` is
    /// false or the file cannot be initialized. Never fails: a broken cache
    /// file must not take client construction down with it.
    pub async fn open(path: &Path, enabled: bool) -> Self {
        let pool = if enabled {
            Self::init_backend(path).await
        } else {
            None
        };
        SessionStore {
            cache: HashMap::new(),
            probed: HashSet::new(),
            pool,
        }
    }

    async fn init_backend(path: &Path) -> Option<Pool<Sqlite>> {
        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("unable to create {}: {}", dir.display(), e);
                return None;
            }
        }

        let url = format!("sqlite://{}", path.display());
        let options = match SqliteConnectOptions::from_str(&url) {
            Ok(options) => options
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .create_if_missing(true),
            Err(e) => {
                warn!("unable to open {}: {}", path.display(), e);
                return None;
            }
        };

        let pool = match SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("unable to connect to {}: {}", path.display(), e);
                return None;
            }
        };

        let schema = "CREATE TABLE IF NOT EXISTS sessions (
                username TEXT NOT NULL,
                base_url TEXT NOT NULL,
                session_id TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (username, base_url)
            )";
        if let Err(e) = sqlx::query(schema).execute(&pool).await {
            // probably not a database
            warn!("unable to initialize {}: {}", path.display(), e);
            return None;
        }

        Some(pool)
    }

    /// True when tokens will survive process exit.
    pub fn persistent(&self) -> bool {
        self.pool.is_some()
    }

    /// Look up a token, consulting disk once per key and run. A miss after
    /// that probe is authoritative: no session exists anywhere.
    pub async fn get(&mut self, key: &SessionKey) -> Option<String> {
        if let Some(token) = self.cache.get(key) {
            return Some(token.clone());
        }
        if !self.probed.insert(key.clone()) {
            return None;
        }
        if key.username.is_empty() {
            // anonymous sessions are never persisted
            return None;
        }
        let pool = self.pool.as_ref()?;

        let row: Option<String> = match sqlx::query_scalar(
            "SELECT session_id FROM sessions WHERE username = ? AND base_url = ?",
        )
        .bind(&key.username)
        .bind(&key.base_url)
        .fetch_optional(pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!("session lookup failed: {}", e);
                None
            }
        };

        match row {
            Some(token) => {
                self.cache.insert(key.clone(), token.clone());
                Some(token)
            }
            None => {
                debug!("no session cached for {:?}", key.username);
                None
            }
        }
    }

    /// Store a token, overwriting any previous one for the same key.
    pub async fn set(&mut self, key: &SessionKey, token: &str) {
        self.cache.insert(key.clone(), token.to_string());
        self.probed.insert(key.clone());
        if key.username.is_empty() {
            return;
        }
        if let Some(pool) = &self.pool {
            let result = sqlx::query(
                "INSERT INTO sessions (username, base_url, session_id) VALUES (?, ?, ?)
                 ON CONFLICT(username, base_url) DO UPDATE SET
                    session_id = excluded.session_id,
                    updated_at = CURRENT_TIMESTAMP",
            )
            .bind(&key.username)
            .bind(&key.base_url)
            .bind(token)
            .execute(pool)
            .await;
            if let Err(e) = result {
                warn!("unable to persist session: {}", e);
            }
        }
    }

    /// Remove a token from memory and disk. Absent keys are a no-op.
    pub async fn delete(&mut self, key: &SessionKey) {
        self.cache.remove(key);
        self.probed.insert(key.clone());
        if key.username.is_empty() {
            return;
        }
        if let Some(pool) = &self.pool {
            let result = sqlx::query("DELETE FROM sessions WHERE username = ? AND base_url = ?")
                .bind(&key.username)
                .bind(&key.base_url)
                .execute(pool)
                .await;
            if let Err(e) = result {
                warn!("unable to delete session: {}", e);
            }
        }
    }

    /// Drop a key from memory without touching disk, forcing the next
    /// lookup to re-read the file.
    pub fn forget(&mut self, key: &SessionKey) {
        self.cache.remove(key);
        self.probed.remove(key);
    }

    /// Every persisted session, newest first.
    pub async fn records(&self) -> Vec<SessionRecord> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };
        match sqlx::query_as::<_, SessionRecord>(
            "SELECT username, base_url, session_id, updated_at FROM sessions
             ORDER BY updated_at DESC",
        )
        .fetch_all(pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("unable to list sessions: {}", e);
                Vec::new()
            }
        }
    }
}
