//! Persistent cache for per-function taint summaries.
//!
//! Keyed by `(file_path:function_name, entry_state_hash)`, invalidated by
//! file mtime (a cached entry with `file_mtime >= current` is fresh).
//! An in-process LRU fronts the SQLite store; the store itself evicts the
//! oldest 10% by `last_accessed` once it crosses 10 000 entries.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::Result;

use super::domain::FunctionSummary;

const MAX_ENTRIES: i64 = 10_000;
const LRU_FRONT_CAPACITY: usize = 2048;

/// Hash of the entry state a summary was computed under.
pub fn hash_entry_state(params: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for param in params {
        hasher.update(param.as_bytes());
        hasher.update(b"\x1f");
    }
    hex::encode(hasher.finalize())
}

pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: i64,
}

pub struct SummaryCache {
    conn: Mutex<Connection>,
    /// `(file_mtime, summary)` - the mtime rides along so the front layer
    /// honors the same staleness rule as the store.
    front: Mutex<LruCache<String, (i64, FunctionSummary)>>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
    debug_trace: bool,
}

impl SummaryCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cfg_analysis_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                function_signature TEXT,
                entry_state_hash TEXT,
                analysis_result TEXT,
                file_mtime INTEGER,
                created_at INTEGER,
                hit_count INTEGER DEFAULT 0,
                last_accessed INTEGER,
                UNIQUE(function_signature, entry_state_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_cache_lookup
                ON cfg_analysis_cache(function_signature, entry_state_hash);
            CREATE INDEX IF NOT EXISTS idx_cache_lru
                ON cfg_analysis_cache(last_accessed);",
        )?;
        let capacity = NonZeroUsize::new(LRU_FRONT_CAPACITY)
            .unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            conn: Mutex::new(conn),
            front: Mutex::new(LruCache::new(capacity)),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
            debug_trace: std::env::var("THEAUDITOR_CACHE_DEBUG").is_ok(),
        })
    }

    fn front_key(function_signature: &str, entry_state_hash: &str) -> String {
        format!("{}|{}", function_signature, entry_state_hash)
    }

    /// Retrieve a cached summary if still fresh for `file_mtime`.
    pub fn get(
        &self,
        file_path: &str,
        function_name: &str,
        entry_state_hash: &str,
        file_mtime: i64,
    ) -> Result<Option<FunctionSummary>> {
        let signature = format!("{}:{}", file_path, function_name);
        let key = Self::front_key(&signature, entry_state_hash);

        {
            let mut front = self.front.lock();
            if let Some((cached_mtime, summary)) = front.get(&key) {
                if *cached_mtime >= file_mtime {
                    let summary = summary.clone();
                    *self.hits.lock() += 1;
                    if self.debug_trace {
                        eprintln!("[CACHE] Hit (front) for {}", signature);
                    }
                    return Ok(Some(summary));
                }
                front.pop(&key);
            }
        }

        let conn = self.conn.lock();
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT analysis_result, file_mtime, id
                 FROM cfg_analysis_cache
                 WHERE function_signature = ?1 AND entry_state_hash = ?2",
                params![signature, entry_state_hash],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((result_json, cached_mtime, cache_id)) = row else {
            *self.misses.lock() += 1;
            if self.debug_trace {
                eprintln!("[CACHE] Miss for {}", signature);
            }
            return Ok(None);
        };

        if cached_mtime < file_mtime {
            *self.misses.lock() += 1;
            if self.debug_trace {
                eprintln!("[CACHE] Stale cache for {} (file modified)", signature);
            }
            return Ok(None);
        }

        let now = unix_now();
        conn.execute(
            "UPDATE cfg_analysis_cache
             SET hit_count = hit_count + 1, last_accessed = ?1
             WHERE id = ?2",
            params![now, cache_id],
        )?;
        drop(conn);

        let summary: FunctionSummary = serde_json::from_str(&result_json)?;
        self.front.lock().put(key, (cached_mtime, summary.clone()));
        *self.hits.lock() += 1;
        if self.debug_trace {
            eprintln!("[CACHE] Hit for {}", signature);
        }
        Ok(Some(summary))
    }

    /// Store a freshly computed summary.
    pub fn put(
        &self,
        file_path: &str,
        function_name: &str,
        entry_state_hash: &str,
        file_mtime: i64,
        summary: &FunctionSummary,
    ) -> Result<()> {
        let signature = format!("{}:{}", file_path, function_name);
        let result_json = serde_json::to_string(summary)?;
        let now = unix_now();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cfg_analysis_cache
             (function_signature, entry_state_hash, analysis_result,
              file_mtime, created_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![signature, entry_state_hash, result_json, file_mtime, now, now],
        )?;
        Self::evict_if_needed(&conn, self.debug_trace)?;
        drop(conn);

        self.front.lock().put(
            Self::front_key(&signature, entry_state_hash),
            (file_mtime, summary.clone()),
        );
        Ok(())
    }

    /// Over the cap, drop the oldest 10% by last access.
    fn evict_if_needed(conn: &Connection, trace: bool) -> Result<()> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cfg_analysis_cache", [], |row| row.get(0))?;
        if count <= MAX_ENTRIES {
            return Ok(());
        }
        let to_delete = count / 10;
        if trace {
            eprintln!("[CACHE] Evicting {} entries", to_delete);
        }
        conn.execute(
            "DELETE FROM cfg_analysis_cache
             WHERE id IN (
                 SELECT id FROM cfg_analysis_cache
                 ORDER BY last_accessed ASC
                 LIMIT ?1
             )",
            params![to_delete],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let entries: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM cfg_analysis_cache", [], |row| row.get(0))?;
        Ok(CacheStats {
            hits: *self.hits.lock(),
            misses: *self.misses.lock(),
            entries,
        })
    }

    pub fn clear(&self) -> Result<()> {
        debug!("clearing summary cache");
        self.conn
            .lock()
            .execute("DELETE FROM cfg_analysis_cache", [])?;
        self.front.lock().clear();
        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> FunctionSummary {
        let mut s = FunctionSummary::new(id);
        s.tainted_params.insert(0);
        s
    }

    #[test]
    fn test_round_trip_and_hit_counting() {
        let cache = SummaryCache::in_memory().expect("open");
        let hash = hash_entry_state(&["q"]);
        assert!(cache.get("a.py", "f", &hash, 100).expect("get").is_none());

        cache
            .put("a.py", "f", &hash, 100, &summary("a.py:f"))
            .expect("put");
        let fetched = cache.get("a.py", "f", &hash, 100).expect("get").expect("hit");
        assert!(fetched.propagates_param(0));

        let stats = cache.stats().expect("stats");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_mtime_staleness() {
        let cache = SummaryCache::in_memory().expect("open");
        let hash = hash_entry_state(&["q"]);
        cache
            .put("a.py", "f", &hash, 100, &summary("a.py:f"))
            .expect("put");
        // File modified after caching -> stale.
        assert!(cache.get("a.py", "f", &hash, 200).expect("get").is_none());
        // Equal mtime -> fresh.
        assert!(cache.get("a.py", "f", &hash, 100).expect("get").is_some());
    }

    #[test]
    fn test_entry_state_hash_distinguishes_states() {
        let a = hash_entry_state(&["q"]);
        let b = hash_entry_state(&["q", "limit"]);
        assert_ne!(a, b);
        assert_eq!(a, hash_entry_state(&["q"]));
    }
}
