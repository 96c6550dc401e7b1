//! libSQL storage layer (local file mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the two pieces of
//! durable state the pipeline owns:
//! - the daily keyword cache, keyed by `(cache_date, platform)`
//! - the append-only pack log
//!
//! **Access rules:**
//! - the `generate` path opens read-write via [`Storage::open`]
//! - inspection commands may use [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use writerpack_shared::{KeywordCacheEntry, Result, WriterPack, WriterPackError};

/// Date format for `cache_date` columns.
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WriterPackError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    WriterPackError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(WriterPackError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Keyword cache
    // -----------------------------------------------------------------------

    /// Exact-match lookup of a day's summary for one platform.
    ///
    /// Pure read: a miss for today never falls back to an older day.
    pub async fn get_keyword_cache(
        &self,
        day: NaiveDate,
        platform: &str,
    ) -> Result<Option<KeywordCacheEntry>> {
        let day_str = day.format(DAY_FORMAT).to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT cache_date, platform, keywords_json, raw_row_count, created_at
                 FROM keyword_cache WHERE cache_date = ?1 AND platform = ?2",
                params![day_str.as_str(), platform],
            )
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_cache_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(WriterPackError::Storage(e.to_string())),
        }
    }

    /// Write a day's summary for one platform.
    ///
    /// A single upsert statement, so concurrent writers for the same key
    /// resolve to whichever row landed last and readers never observe a
    /// partially written entry.
    pub async fn put_keyword_cache(&self, entry: &KeywordCacheEntry) -> Result<()> {
        self.check_writable()?;
        let day_str = entry.cache_date.format(DAY_FORMAT).to_string();
        let keywords_json = serde_json::to_string(&entry.keywords)
            .map_err(|e| WriterPackError::Storage(format!("encode keywords: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO keyword_cache (cache_date, platform, keywords_json, raw_row_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(cache_date, platform) DO UPDATE SET
                   keywords_json = excluded.keywords_json,
                   raw_row_count = excluded.raw_row_count,
                   created_at = excluded.created_at",
                params![
                    day_str.as_str(),
                    entry.source_platform.as_str(),
                    keywords_json.as_str(),
                    entry.raw_row_count as i64,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All cached platform summaries for a day, ordered by platform.
    pub async fn list_keyword_cache(&self, day: NaiveDate) -> Result<Vec<KeywordCacheEntry>> {
        let day_str = day.format(DAY_FORMAT).to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT cache_date, platform, keywords_json, raw_row_count, created_at
                 FROM keyword_cache WHERE cache_date = ?1 ORDER BY platform",
                params![day_str.as_str()],
            )
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        collect_rows(&mut rows, row_to_cache_entry).await
    }

    // -----------------------------------------------------------------------
    // Pack log
    // -----------------------------------------------------------------------

    /// Append a flattened pack record. Rows are never updated or deleted.
    pub async fn append_pack_log(&self, record: &PackLogRecord) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO pack_log (pack_id, created_at, created_by, topic, audience, structure_used,
                   title, keywords, sources, dropped_sources, internal_links, social_json,
                   article_body, body_sha256, research_policy, degraded, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    record.pack_id.as_str(),
                    record.created_at.to_rfc3339(),
                    record.created_by.as_str(),
                    record.topic.as_str(),
                    record.audience.as_str(),
                    record.structure_used.as_str(),
                    record.title.as_str(),
                    record.keywords.as_str(),
                    record.sources.as_str(),
                    record.dropped_sources.as_str(),
                    record.internal_links.as_str(),
                    record.social_json.as_str(),
                    record.article_body.as_str(),
                    record.body_sha256.as_str(),
                    record.research_policy.as_str(),
                    i64::from(record.degraded),
                    record.metadata_json.as_str(),
                ],
            )
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent log rows first.
    pub async fn list_pack_log(&self, limit: u32) -> Result<Vec<PackLogRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT pack_id, created_at, created_by, topic, audience, structure_used, title,
                   keywords, sources, dropped_sources, internal_links, social_json, article_body,
                   body_sha256, research_policy, degraded, metadata_json
                 FROM pack_log ORDER BY created_at DESC, pack_id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| WriterPackError::Storage(e.to_string()))?;

        collect_rows(&mut rows, row_to_log_record).await
    }
}

// ---------------------------------------------------------------------------
// PackLogRecord
// ---------------------------------------------------------------------------

/// A [`WriterPack`] flattened into one audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackLogRecord {
    pub pack_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub topic: String,
    pub audience: String,
    pub structure_used: String,
    pub title: String,
    /// Comma-separated keywords.
    pub keywords: String,
    /// Newline-separated briefing source URLs.
    pub sources: String,
    /// Newline-separated rejected sources, each `<url>\t<reason>`.
    pub dropped_sources: String,
    /// Newline-separated internal link URLs.
    pub internal_links: String,
    pub social_json: String,
    pub article_body: String,
    /// SHA-256 of `article_body`, hex encoded.
    pub body_sha256: String,
    pub research_policy: String,
    pub degraded: bool,
    pub metadata_json: String,
}

impl PackLogRecord {
    /// Flatten a pack for the log.
    pub fn from_pack(pack: &WriterPack) -> Result<Self> {
        let social_json = serde_json::to_string(&pack.social_posts)
            .map_err(|e| WriterPackError::Storage(format!("encode social posts: {e}")))?;
        let metadata_json = serde_json::to_string(&pack.metadata)
            .map_err(|e| WriterPackError::Storage(format!("encode metadata: {e}")))?;

        let internal_links = pack
            .internal_links
            .iter()
            .flat_map(|s| s.candidates.iter().map(|c| c.url.as_str()))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Self {
            pack_id: pack.metadata.pack_id.to_string(),
            created_at: pack.created_at,
            created_by: pack.created_by.clone(),
            topic: pack.topic.to_string(),
            audience: pack.audience.as_str().to_string(),
            structure_used: pack.structure_used.slug().to_string(),
            title: pack.title.clone(),
            keywords: pack.keywords_used.join(", "),
            sources: pack
                .briefing_sources
                .iter()
                .map(|s| s.url.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            dropped_sources: pack
                .dropped_sources
                .iter()
                .map(|d| format!("{}\t{}", d.url, d.reason))
                .collect::<Vec<_>>()
                .join("\n"),
            internal_links,
            social_json,
            article_body: pack.article_body.clone(),
            body_sha256: body_hash(&pack.article_body),
            research_policy: pack.metadata.research_policy.as_str().to_string(),
            degraded: pack.metadata.degraded,
            metadata_json,
        })
    }
}

/// Hex SHA-256 of an article body.
pub fn body_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn storage_err(e: impl std::fmt::Display) -> WriterPackError {
    WriterPackError::Storage(e.to_string())
}

/// Map every row, stopping at the first step or mapping error.
async fn collect_rows<T>(
    rows: &mut libsql::Rows,
    map: fn(&libsql::Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut results = Vec::new();
    while let Some(row) = rows.next().await.map_err(storage_err)? {
        results.push(map(&row)?);
    }
    Ok(results)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WriterPackError::Storage(format!("invalid timestamp: {e}")))
}

/// Convert a database row to a [`KeywordCacheEntry`].
fn row_to_cache_entry(row: &libsql::Row) -> Result<KeywordCacheEntry> {
    let day: String = row.get(0).map_err(storage_err)?;
    let keywords_json: String = row.get(2).map_err(storage_err)?;
    let created_at: String = row.get(4).map_err(storage_err)?;

    Ok(KeywordCacheEntry {
        cache_date: NaiveDate::parse_from_str(&day, DAY_FORMAT)
            .map_err(|e| WriterPackError::Storage(format!("invalid cache date: {e}")))?,
        source_platform: row.get::<String>(1).map_err(storage_err)?,
        keywords: serde_json::from_str(&keywords_json)
            .map_err(|e| WriterPackError::Storage(format!("invalid keywords column: {e}")))?,
        raw_row_count: row.get::<i64>(3).map_err(storage_err)? as usize,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Convert a database row to a [`PackLogRecord`].
fn row_to_log_record(row: &libsql::Row) -> Result<PackLogRecord> {
    let created_at: String = row.get(1).map_err(storage_err)?;
    Ok(PackLogRecord {
        pack_id: row.get(0).map_err(storage_err)?,
        created_at: parse_timestamp(&created_at)?,
        created_by: row.get(2).map_err(storage_err)?,
        topic: row.get(3).map_err(storage_err)?,
        audience: row.get(4).map_err(storage_err)?,
        structure_used: row.get(5).map_err(storage_err)?,
        title: row.get(6).map_err(storage_err)?,
        keywords: row.get(7).map_err(storage_err)?,
        sources: row.get(8).map_err(storage_err)?,
        dropped_sources: row.get(9).map_err(storage_err)?,
        internal_links: row.get(10).map_err(storage_err)?,
        social_json: row.get(11).map_err(storage_err)?,
        article_body: row.get(12).map_err(storage_err)?,
        body_sha256: row.get(13).map_err(storage_err)?,
        research_policy: row.get(14).map_err(storage_err)?,
        degraded: row.get::<i64>(15).map_err(storage_err)? != 0,
        metadata_json: row.get(16).map_err(storage_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("wp_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn entry(d: u32, platform: &str, keywords: &[&str]) -> KeywordCacheEntry {
        KeywordCacheEntry {
            cache_date: day(d),
            source_platform: platform.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            raw_row_count: 12,
            created_at: Utc::now(),
        }
    }

    fn sample_record(id: &str, body: &str) -> PackLogRecord {
        PackLogRecord {
            pack_id: id.into(),
            created_at: Utc::now(),
            created_by: "tester".into(),
            topic: "exam stress".into(),
            audience: "youth".into(),
            structure_used: "listicle".into(),
            title: "Beating Exam Stress".into(),
            keywords: "exam stress, study tips".into(),
            sources: "https://example.org/a".into(),
            dropped_sources: "https://example.org/a\tduplicate".into(),
            internal_links: String::new(),
            social_json: "[]".into(),
            article_body: body.into(),
            body_sha256: body_hash(body),
            research_policy: "proceed-degraded".into(),
            degraded: false,
            metadata_json: "{}".into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("wp_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn keyword_cache_miss_then_hit() {
        let storage = test_storage().await;

        let miss = storage.get_keyword_cache(day(19), "reddit").await.unwrap();
        assert!(miss.is_none());

        let written = entry(19, "reddit", &["exam stress", "sleep"]);
        storage.put_keyword_cache(&written).await.expect("put");

        let first = storage.get_keyword_cache(day(19), "reddit").await.unwrap();
        let second = storage.get_keyword_cache(day(19), "reddit").await.unwrap();
        assert_eq!(first, second);
        let first = first.expect("hit");
        assert_eq!(first.keywords, vec!["exam stress", "sleep"]);
        assert_eq!(first.raw_row_count, 12);
    }

    #[tokio::test]
    async fn keyword_cache_is_day_scoped() {
        let storage = test_storage().await;
        storage
            .put_keyword_cache(&entry(19, "reddit", &["exam stress"]))
            .await
            .unwrap();

        assert!(storage.get_keyword_cache(day(18), "reddit").await.unwrap().is_none());
        assert!(storage.get_keyword_cache(day(20), "reddit").await.unwrap().is_none());
        assert!(storage.get_keyword_cache(day(19), "tumblr").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keyword_cache_last_writer_wins() {
        let storage = test_storage().await;
        storage
            .put_keyword_cache(&entry(19, "youtube", &["first"]))
            .await
            .unwrap();
        storage
            .put_keyword_cache(&entry(19, "youtube", &["second", "set"]))
            .await
            .unwrap();

        let found = storage.get_keyword_cache(day(19), "youtube").await.unwrap().unwrap();
        assert_eq!(found.keywords, vec!["second", "set"]);

        let all = storage.list_keyword_cache(day(19)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn pack_log_appends_and_lists() {
        let storage = test_storage().await;
        storage
            .append_pack_log(&sample_record("pack-1", "first body"))
            .await
            .expect("append 1");
        storage
            .append_pack_log(&sample_record("pack-2", "second body"))
            .await
            .expect("append 2");

        let rows = storage.list_pack_log(10).await.expect("list");
        assert_eq!(rows.len(), 2);
        let first = rows.iter().find(|r| r.pack_id == "pack-1").unwrap();
        assert_eq!(first.body_sha256, body_hash("first body"));
        assert!(!first.degraded);
        assert_eq!(first.dropped_sources, "https://example.org/a\tduplicate");

        let limited = storage.list_pack_log(1).await.expect("list limited");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn pack_log_rejects_duplicate_ids() {
        let storage = test_storage().await;
        storage
            .append_pack_log(&sample_record("pack-1", "body"))
            .await
            .unwrap();
        let again = storage.append_pack_log(&sample_record("pack-1", "changed")).await;
        assert!(again.is_err());

        let rows = storage.list_pack_log(10).await.unwrap();
        assert_eq!(rows[0].article_body, "body");
    }

    #[tokio::test]
    async fn pack_log_rows_cannot_be_changed() {
        let storage = test_storage().await;
        storage
            .append_pack_log(&sample_record("pack-1", "body"))
            .await
            .unwrap();

        let update = storage
            .conn
            .execute("UPDATE pack_log SET title = 'edited' WHERE pack_id = 'pack-1'", ())
            .await;
        assert!(update.unwrap_err().to_string().contains("append-only"));

        let delete = storage.conn.execute("DELETE FROM pack_log", ()).await;
        assert!(delete.unwrap_err().to_string().contains("append-only"));

        let rows = storage.list_pack_log(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Beating Exam Stress");
    }

    #[tokio::test]
    async fn row_step_errors_are_not_swallowed() {
        let storage = test_storage().await;
        // abs() of the smallest integer overflows while stepping.
        let query = storage
            .conn
            .query("SELECT 1 UNION ALL SELECT abs(-9223372036854775807 - 1)", ())
            .await;
        let result = match query {
            Ok(mut rows) => {
                collect_rows(&mut rows, |row| row.get::<i64>(0).map_err(storage_err)).await
            }
            Err(e) => Err(storage_err(e)),
        };
        assert!(matches!(result, Err(WriterPackError::Storage(_))));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("wp_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.put_keyword_cache(&entry(19, "reddit", &["a"])).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.put_keyword_cache(&entry(19, "reddit", &["b"])).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));

        let kept = ro.get_keyword_cache(day(19), "reddit").await.unwrap().unwrap();
        assert_eq!(kept.keywords, vec!["a"]);
    }

    #[test]
    fn body_hash_is_stable() {
        assert_eq!(body_hash("hello"), body_hash("hello"));
        assert_ne!(body_hash("hello"), body_hash("hello!"));
        assert_eq!(body_hash("").len(), 64);
    }
}
