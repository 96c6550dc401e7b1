//! Seams between the pipeline and the outside world.
//!
//! Every external dependency the stages touch (language models, site search,
//! the trend feed, the CMS, storage) is reached through one of these traits,
//! so stages can be exercised against in-memory fakes.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use writerpack_shared::{KeywordCacheEntry, Result, SourceLink, WriterPack, WriterPackError};
use writerpack_storage::{PackLogRecord, Storage};

/// One raw row from a trend feed, as delivered.
pub type TrendRow = serde_json::Map<String, serde_json::Value>;

/// Lightweight text generation: keyword summaries and search queries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Retrieval-grounded generation. Returns the raw model answer, which is
/// expected (but not guaranteed) to carry a summary and a sources list.
#[async_trait]
pub trait ResearchModel: Send + Sync {
    async fn research(&self, prompt: &str) -> Result<String>;
}

/// Long-form creative generation for the article and social posts.
#[async_trait]
pub trait DraftModel: Send + Sync {
    async fn draft(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Search restricted to a single site.
#[async_trait]
pub trait SiteSearch: Send + Sync {
    async fn search(&self, query: &str, site_domain: &str, limit: usize)
    -> Result<Vec<SourceLink>>;
}

/// Raw trending rows for one platform.
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn fetch_rows(&self, platform: &str) -> Result<Vec<TrendRow>>;
}

/// Day-scoped keyword cache.
///
/// `get` is a pure read and must never return another day's entry.
#[async_trait]
pub trait TrendCache: Send + Sync {
    async fn get(&self, day: NaiveDate, platform: &str) -> Result<Option<KeywordCacheEntry>>;
    async fn put(&self, entry: &KeywordCacheEntry) -> Result<()>;
}

/// Append-only record of produced packs.
#[async_trait]
pub trait PackLog: Send + Sync {
    async fn append(&self, pack: &WriterPack) -> Result<()>;
}

/// A draft post created in the CMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDraft {
    pub id: u64,
    pub link: Option<String>,
}

/// Destination for human-approved drafts. Drafts only, never live posts.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn create_draft(&self, title: &str, body: &str) -> Result<PublishedDraft>;
}

// ---------------------------------------------------------------------------
// Storage-backed implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl TrendCache for Storage {
    async fn get(&self, day: NaiveDate, platform: &str) -> Result<Option<KeywordCacheEntry>> {
        self.get_keyword_cache(day, platform).await
    }

    async fn put(&self, entry: &KeywordCacheEntry) -> Result<()> {
        self.put_keyword_cache(entry).await
    }
}

#[async_trait]
impl PackLog for Storage {
    async fn append(&self, pack: &WriterPack) -> Result<()> {
        let record = PackLogRecord::from_pack(pack)?;
        self.append_pack_log(&record).await
    }
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

/// Process-local cache for callers that embed the pipeline without a
/// database. Entries live only as long as the value.
#[derive(Debug, Default)]
pub struct MemoryTrendCache {
    entries: RwLock<HashMap<(NaiveDate, String), KeywordCacheEntry>>,
}

impl MemoryTrendCache {
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

#[async_trait]
impl TrendCache for MemoryTrendCache {
    async fn get(&self, day: NaiveDate, platform: &str) -> Result<Option<KeywordCacheEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| WriterPackError::Storage("keyword cache lock poisoned".into()))?;
        Ok(entries.get(&(day, platform.to_string())).cloned())
    }

    async fn put(&self, entry: &KeywordCacheEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| WriterPackError::Storage("keyword cache lock poisoned".into()))?;
        entries.insert(
            (entry.cache_date, entry.source_platform.clone()),
            entry.clone(),
        );
        Ok(())
    }
}
