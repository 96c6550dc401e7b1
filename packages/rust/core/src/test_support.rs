//! In-process fakes for the capability traits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use writerpack_shared::{Result, SourceLink, WriterPack, WriterPackError};

use crate::capabilities::{
    DraftModel, PackLog, PublishSink, PublishedDraft, ResearchModel, SiteSearch, TextGenerator,
    TrendRow, TrendSource,
};

type Responder = Box<dyn Fn(&str, &str) -> Result<String> + Send + Sync>;

/// A model backed by a closure of `(system, prompt)`. Serves every
/// generation role; research calls see an empty system prompt.
pub struct FnModel {
    respond: Responder,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FnModel {
    pub fn new(f: impl Fn(&str, &str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(f),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A model that always answers `text`.
    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(system, prompt)
    }
}

#[async_trait]
impl TextGenerator for FnModel {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.answer(system, prompt).await
    }
}

#[async_trait]
impl ResearchModel for FnModel {
    async fn research(&self, prompt: &str) -> Result<String> {
        self.answer("", prompt).await
    }
}

#[async_trait]
impl DraftModel for FnModel {
    async fn draft(&self, system: &str, prompt: &str) -> Result<String> {
        self.answer(system, prompt).await
    }
}

/// Build a trend row from a JSON object literal.
pub fn row(value: serde_json::Value) -> TrendRow {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("trend row must be an object, got {other}"),
    }
}

/// Trend rows keyed by platform; unknown platforms yield no rows.
#[derive(Default)]
pub struct StaticTrendSource {
    rows: HashMap<String, Vec<TrendRow>>,
    failing: Vec<String>,
}

impl StaticTrendSource {
    pub fn with_rows(mut self, platform: &str, rows: Vec<TrendRow>) -> Self {
        self.rows.insert(platform.to_string(), rows);
        self
    }

    pub fn with_error(mut self, platform: &str) -> Self {
        self.failing.push(platform.to_string());
        self
    }
}

#[async_trait]
impl TrendSource for StaticTrendSource {
    async fn fetch_rows(&self, platform: &str) -> Result<Vec<TrendRow>> {
        if self.failing.iter().any(|p| p == platform) {
            return Err(WriterPackError::Network(format!("{platform} feed offline")));
        }
        Ok(self.rows.get(platform).cloned().unwrap_or_default())
    }
}

type SearchResponder = Box<dyn Fn(&str) -> Result<Vec<SourceLink>> + Send + Sync>;

/// Site search backed by a closure of the query.
pub struct FnSearch {
    respond: SearchResponder,
    calls: AtomicUsize,
}

impl FnSearch {
    pub fn new(f: impl Fn(&str) -> Result<Vec<SourceLink>> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(f),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_| Ok(Vec::new()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteSearch for FnSearch {
    async fn search(&self, query: &str, _site: &str, limit: usize) -> Result<Vec<SourceLink>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut links = (self.respond)(query)?;
        links.truncate(limit);
        Ok(links)
    }
}

pub fn link(url: &str, title: &str) -> SourceLink {
    SourceLink {
        url: url.into(),
        title: title.into(),
    }
}

/// Pack log that keeps packs in memory, optionally failing every append.
#[derive(Default)]
pub struct MemoryPackLog {
    pub packs: Mutex<Vec<WriterPack>>,
    pub fail: bool,
}

impl MemoryPackLog {
    pub fn failing() -> Self {
        Self {
            packs: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn len(&self) -> usize {
        self.packs.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PackLog for MemoryPackLog {
    async fn append(&self, pack: &WriterPack) -> Result<()> {
        if self.fail {
            return Err(WriterPackError::Storage("log sink unavailable".into()));
        }
        self.packs
            .lock()
            .map_err(|_| WriterPackError::Storage("poisoned".into()))?
            .push(pack.clone());
        Ok(())
    }
}

/// Publish sink that records titles, optionally failing.
#[derive(Default)]
pub struct RecordingPublisher {
    pub titles: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl PublishSink for RecordingPublisher {
    async fn create_draft(&self, title: &str, _body: &str) -> Result<PublishedDraft> {
        if self.fail {
            return Err(WriterPackError::Http {
                service: "wordpress".into(),
                status: 403,
                message: "forbidden".into(),
            });
        }
        let mut titles = self
            .titles
            .lock()
            .map_err(|_| WriterPackError::Storage("poisoned".into()))?;
        titles.push(title.to_string());
        Ok(PublishedDraft {
            id: titles.len() as u64,
            link: Some(format!("https://shadee.care/?p={}", titles.len())),
        })
    }
}
