//! Trend keyword resolution: daily cache, summarization, fallback.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use writerpack_shared::{KeywordCacheEntry, KeywordSource, Result, WriterPackError};

use crate::capabilities::{TextGenerator, TrendCache, TrendRow, TrendSource};
use crate::parse::parse_list;
use crate::retry::{RetryPolicy, with_retry};

/// Column holding the post timestamp in exported trend sheets.
pub const DATE_COLUMN: &str = "post_dt";

/// Candidate text columns, most specific first. Platforms export
/// different layouts, so the first one present wins.
pub const TEXT_COLUMNS: [&str; 6] = [
    "Keyword",
    "keyword",
    "Post Content",
    "post_content",
    "Title",
    "text",
];

/// Longest phrase accepted as a single keyword.
const MAX_KEYWORD_CHARS: usize = 60;

/// Upper bound on rows sent to the model in one prompt.
const MAX_PROMPT_ROWS: usize = 200;

/// Longest row excerpt sent to the model.
const MAX_ROW_CHARS: usize = 280;

const SUMMARIZE_SYSTEM: &str = "You analyse social-listening data for a youth mental health \
publication. You answer with a JSON array of short lowercase keyword phrases and nothing else.";

// ---------------------------------------------------------------------------
// Row handling
// ---------------------------------------------------------------------------

/// Pull usable text out of raw rows.
///
/// Rows dated before `today - lookback_days` are skipped; rows without a
/// parseable date are kept. Rows with no text column, or whose text is
/// empty after cleaning, are skipped.
pub fn extract_row_texts(rows: &[TrendRow], today: NaiveDate, lookback_days: u32) -> Vec<String> {
    let cutoff = today - chrono::Days::new(u64::from(lookback_days));
    let mut texts = Vec::new();

    for row in rows {
        if let Some(day) = row.get(DATE_COLUMN).and_then(parse_row_day) {
            if day < cutoff {
                continue;
            }
        }

        let Some(raw) = TEXT_COLUMNS
            .iter()
            .find_map(|col| row.get(*col).and_then(value_text))
        else {
            continue;
        };

        let cleaned = sanitize(&raw);
        if !cleaned.is_empty() {
            texts.push(cleaned);
        }
    }
    texts
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_row_day(value: &Value) -> Option<NaiveDate> {
    let raw = match value {
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    None
}

/// Drop replacement and control characters, collapse whitespace.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .filter(|c| *c != '\u{FFFD}')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase, trim, de-duplicate (order kept) and cap a keyword list.
pub fn normalize_keywords<I, S>(raw: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for kw in raw {
        let kw = kw
            .as_ref()
            .trim()
            .trim_start_matches('#')
            .trim_matches(|c: char| c == '.' || c == '"' || c == '\'')
            .trim()
            .to_lowercase();
        if kw.is_empty() || kw.chars().count() > MAX_KEYWORD_CHARS {
            continue;
        }
        if seen.insert(kw.clone()) {
            out.push(kw);
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Condenses raw trend rows into a short keyword list and caches it.
pub struct TrendSummarizer {
    generator: Arc<dyn TextGenerator>,
    cache: Arc<dyn TrendCache>,
    retry: RetryPolicy,
    max_keywords: usize,
    lookback_days: u32,
}

impl TrendSummarizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        cache: Arc<dyn TrendCache>,
        retry: RetryPolicy,
        max_keywords: usize,
        lookback_days: u32,
    ) -> Self {
        Self {
            generator,
            cache,
            retry,
            max_keywords: max_keywords.max(1),
            lookback_days,
        }
    }

    /// Summarize `rows` for `platform` and write the result under `day`.
    ///
    /// Fails with [`WriterPackError::Summarization`] when no row is usable,
    /// the generation call fails, or its output yields no keywords. A failed
    /// cache write is logged and does not fail the call.
    #[instrument(skip_all, fields(platform = %platform, rows = rows.len()))]
    pub async fn summarize(
        &self,
        rows: &[TrendRow],
        platform: &str,
        day: NaiveDate,
    ) -> Result<Vec<String>> {
        let texts = extract_row_texts(rows, day, self.lookback_days);
        if texts.is_empty() {
            return Err(WriterPackError::Summarization(format!(
                "no usable rows for {platform}"
            )));
        }
        debug!(usable = texts.len(), "summarizing trend rows");

        let prompt = summarize_prompt(platform, &texts, self.max_keywords);
        let prompt = prompt.as_str();
        let generator = &self.generator;
        let raw = with_retry(&self.retry, "trend summary", move || {
            generator.complete(SUMMARIZE_SYSTEM, prompt)
        })
        .await
        .map_err(|e| WriterPackError::Summarization(e.to_string()))?;

        let parsed = parse_list(&raw);
        let keywords = normalize_keywords(&parsed.items, self.max_keywords);
        if keywords.is_empty() {
            return Err(WriterPackError::Summarization(format!(
                "no keywords in {platform} summary output"
            )));
        }

        let entry = KeywordCacheEntry {
            cache_date: day,
            source_platform: platform.to_string(),
            keywords: keywords.clone(),
            raw_row_count: rows.len(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.cache.put(&entry).await {
            warn!(error = %e, "failed to write keyword cache");
        }

        info!(keywords = keywords.len(), quality = ?parsed.quality, "trend keywords summarized");
        Ok(keywords)
    }
}

fn summarize_prompt(platform: &str, texts: &[String], max_keywords: usize) -> String {
    let mut prompt = format!(
        "Below are recent posts and search terms collected from {platform}.\n\
         Identify the {max_keywords} most prominent mental-health and wellbeing themes \
         young people are talking about. Reply with a JSON array of short keyword \
         phrases (1-4 words each), most relevant first.\n\nData:\n"
    );
    for text in texts.iter().take(MAX_PROMPT_ROWS) {
        prompt.push_str("- ");
        prompt.extend(text.chars().take(MAX_ROW_CHARS));
        prompt.push('\n');
    }
    prompt
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// How one platform's keywords were obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOutcome {
    CacheHit(usize),
    Summarized(usize),
    Failed(String),
}

/// Keywords handed to the Writer, with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedKeywords {
    pub keywords: Vec<String>,
    pub source: KeywordSource,
    /// Some platform failed, or the fallback list is in use.
    pub degraded: bool,
    pub platforms: Vec<(String, PlatformOutcome)>,
}

/// Resolves the day's keywords: cache, then summarization, then fallback.
pub struct KeywordResolver {
    cache: Arc<dyn TrendCache>,
    source: Arc<dyn TrendSource>,
    summarizer: TrendSummarizer,
    platforms: Vec<String>,
    fallback: Vec<String>,
}

impl KeywordResolver {
    pub fn new(
        cache: Arc<dyn TrendCache>,
        source: Arc<dyn TrendSource>,
        summarizer: TrendSummarizer,
        platforms: Vec<String>,
        fallback: Vec<String>,
    ) -> Self {
        let fallback = if fallback.iter().all(|k| k.trim().is_empty()) {
            writerpack_shared::DEFAULT_FALLBACK_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect()
        } else {
            fallback
        };
        Self {
            cache,
            source,
            summarizer,
            platforms,
            fallback,
        }
    }

    /// The list used when no platform yields keywords.
    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    /// Never fails and never returns an empty list.
    #[instrument(skip_all, fields(day = %day))]
    pub async fn resolve(&self, day: NaiveDate) -> ResolvedKeywords {
        let mut keywords: Vec<String> = Vec::new();
        let mut platforms = Vec::with_capacity(self.platforms.len());
        let mut any_summarized = false;
        let mut any_failed = false;

        for platform in &self.platforms {
            let outcome = match self.resolve_platform(day, platform).await {
                Ok((found, from_cache)) => {
                    for kw in &found {
                        if !keywords.contains(kw) {
                            keywords.push(kw.clone());
                        }
                    }
                    if from_cache {
                        PlatformOutcome::CacheHit(found.len())
                    } else {
                        any_summarized = true;
                        PlatformOutcome::Summarized(found.len())
                    }
                }
                Err(e) => {
                    warn!(platform = %platform, error = %e, "trend keywords unavailable");
                    any_failed = true;
                    PlatformOutcome::Failed(e.to_string())
                }
            };
            platforms.push((platform.clone(), outcome));
        }

        if keywords.is_empty() {
            info!("using fallback keyword list");
            return ResolvedKeywords {
                keywords: self.fallback.clone(),
                source: KeywordSource::Fallback,
                degraded: true,
                platforms,
            };
        }

        let source = if any_summarized {
            KeywordSource::Summarized
        } else {
            KeywordSource::Cache
        };
        info!(count = keywords.len(), ?source, "trend keywords resolved");
        ResolvedKeywords {
            keywords,
            source,
            degraded: any_failed,
            platforms,
        }
    }

    async fn resolve_platform(&self, day: NaiveDate, platform: &str) -> Result<(Vec<String>, bool)> {
        match self.cache.get(day, platform).await {
            Ok(Some(entry)) if !entry.keywords.is_empty() => {
                debug!(platform, "keyword cache hit");
                return Ok((entry.keywords, true));
            }
            Ok(_) => debug!(platform, "keyword cache miss"),
            Err(e) => warn!(platform, error = %e, "keyword cache read failed, recomputing"),
        }

        let rows = self
            .source
            .fetch_rows(platform)
            .await
            .map_err(|e| WriterPackError::Summarization(format!("trend source: {e}")))?;
        let keywords = self.summarizer.summarize(&rows, platform, day).await?;
        Ok((keywords, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryTrendCache;
    use crate::test_support::{FnModel, StaticTrendSource, row};
    use serde_json::json;
    use std::time::Duration;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            timeout: Duration::from_millis(500),
            backoff: Duration::from_millis(1),
        }
    }

    fn summarizer(
        generator: Arc<dyn TextGenerator>,
        cache: Arc<dyn TrendCache>,
    ) -> TrendSummarizer {
        TrendSummarizer::new(generator, cache, quick_retry(), 5, 30)
    }

    #[test]
    fn row_texts_respect_window_and_columns() {
        let rows = vec![
            row(json!({"post_dt": "2026-03-09 10:00:00", "Keyword": "Exam Stress"})),
            row(json!({"post_dt": "2025-12-01", "Keyword": "too old"})),
            row(json!({"Post Content": "no date\u{FFFD} but\u{0007}kept"})),
            row(json!({"post_dt": "garbage", "text": "bad date kept"})),
            row(json!({"post_dt": "2026-03-09", "other": "no text column"})),
            row(json!({"Keyword": "   "})),
        ];
        let texts = extract_row_texts(&rows, day(), 30);
        assert_eq!(texts, vec!["Exam Stress", "no date but kept", "bad date kept"]);
    }

    #[test]
    fn keywords_are_normalized() {
        let kws = normalize_keywords(
            ["Exam Stress", "#burnout", "exam stress", "", "Sleep."],
            10,
        );
        assert_eq!(kws, vec!["exam stress", "burnout", "sleep"]);
        assert_eq!(normalize_keywords(["a", "b", "c"], 2), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn summarize_writes_cache() {
        let cache = Arc::new(MemoryTrendCache::new());
        let text = Arc::new(FnModel::new(|_, _| Ok(r#"["Exam Stress", "sleep"]"#.into())));
        let s = summarizer(text, cache.clone());
        let rows = vec![row(json!({"Keyword": "exam stress tiktok"}))];

        let kws = s.summarize(&rows, "reddit", day()).await.unwrap();
        assert_eq!(kws, vec!["exam stress", "sleep"]);

        let cached = cache.get(day(), "reddit").await.unwrap().unwrap();
        assert_eq!(cached.keywords, kws);
        assert_eq!(cached.raw_row_count, 1);
    }

    #[tokio::test]
    async fn summarize_rejects_unusable_rows_without_calling_model() {
        let text = Arc::new(FnModel::new(|_, _| Ok("[\"x\"]".into())));
        let s = summarizer(text.clone(), Arc::new(MemoryTrendCache::new()));
        let rows = vec![row(json!({"unrelated": 1}))];

        let err = s.summarize(&rows, "reddit", day()).await.unwrap_err();
        assert!(matches!(err, WriterPackError::Summarization(_)));
        assert_eq!(text.calls(), 0);
    }

    #[tokio::test]
    async fn summarize_fails_on_empty_output() {
        let text = Arc::new(FnModel::new(|_, _| Ok("   ".into())));
        let s = summarizer(text, Arc::new(MemoryTrendCache::new()));
        let rows = vec![row(json!({"Keyword": "exam stress"}))];

        let err = s.summarize(&rows, "reddit", day()).await.unwrap_err();
        assert!(matches!(err, WriterPackError::Summarization(_)));
    }

    fn resolver(
        text: Arc<FnModel>,
        cache: Arc<MemoryTrendCache>,
        source: StaticTrendSource,
        platforms: &[&str],
    ) -> KeywordResolver {
        KeywordResolver::new(
            cache.clone(),
            Arc::new(source),
            summarizer(text, cache),
            platforms.iter().map(|p| p.to_string()).collect(),
            vec!["mental health".into(), "self-care".into()],
        )
    }

    #[tokio::test]
    async fn cache_hit_skips_summarizer() {
        let cache = Arc::new(MemoryTrendCache::new());
        cache
            .put(&KeywordCacheEntry {
                cache_date: day(),
                source_platform: "reddit".into(),
                keywords: vec!["burnout".into()],
                raw_row_count: 4,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let text = Arc::new(FnModel::new(|_, _| Ok("[\"other\"]".into())));
        let r = resolver(text.clone(), cache, StaticTrendSource::default(), &["reddit"]);

        let resolved = r.resolve(day()).await;
        assert_eq!(resolved.keywords, vec!["burnout"]);
        assert_eq!(resolved.source, KeywordSource::Cache);
        assert!(!resolved.degraded);
        assert_eq!(text.calls(), 0);
    }

    #[tokio::test]
    async fn yesterdays_entry_is_not_reused() {
        let cache = Arc::new(MemoryTrendCache::new());
        cache
            .put(&KeywordCacheEntry {
                cache_date: day().pred_opt().unwrap(),
                source_platform: "reddit".into(),
                keywords: vec!["stale".into()],
                raw_row_count: 1,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let text = Arc::new(FnModel::new(|_, _| Ok("[\"fresh\"]".into())));
        let source = StaticTrendSource::default()
            .with_rows("reddit", vec![row(json!({"Keyword": "fresh"}))]);
        let r = resolver(text, cache, source, &["reddit"]);

        let resolved = r.resolve(day()).await;
        assert_eq!(resolved.keywords, vec!["fresh"]);
        assert_eq!(resolved.source, KeywordSource::Summarized);
    }

    #[tokio::test]
    async fn platforms_are_unioned_in_order() {
        let text = Arc::new(FnModel::new(|_, prompt| {
            if prompt.contains("reddit") {
                Ok("[\"exam stress\", \"sleep\"]".into())
            } else {
                Ok("[\"sleep\", \"burnout\"]".into())
            }
        }));
        let source = StaticTrendSource::default()
            .with_rows("reddit", vec![row(json!({"Keyword": "a"}))])
            .with_rows("tumblr", vec![row(json!({"Keyword": "b"}))])
            .with_error("youtube");
        let r = resolver(
            text,
            Arc::new(MemoryTrendCache::new()),
            source,
            &["reddit", "youtube", "tumblr"],
        );

        let resolved = r.resolve(day()).await;
        assert_eq!(resolved.keywords, vec!["exam stress", "sleep", "burnout"]);
        assert!(resolved.degraded);
        assert!(matches!(resolved.platforms[1].1, PlatformOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn total_failure_uses_fallback() {
        let text = Arc::new(FnModel::new(|_, _| {
            Err(WriterPackError::Http {
                service: "openai".into(),
                status: 400,
                message: "bad request".into(),
            })
        }));
        let source =
            StaticTrendSource::default().with_rows("reddit", vec![row(json!({"Keyword": "a"}))]);
        let r = resolver(text, Arc::new(MemoryTrendCache::new()), source, &["reddit"]);

        let resolved = r.resolve(day()).await;
        assert_eq!(resolved.keywords, vec!["mental health", "self-care"]);
        assert_eq!(resolved.source, KeywordSource::Fallback);
        assert!(resolved.degraded);
    }

    #[test]
    fn empty_fallback_uses_default_list() {
        let cache = Arc::new(MemoryTrendCache::new());
        let text = Arc::new(FnModel::new(|_, _| Ok(String::new())));
        let r = KeywordResolver::new(
            cache.clone(),
            Arc::new(StaticTrendSource::default()),
            summarizer(text, cache),
            vec![],
            vec![],
        );
        assert_eq!(
            r.fallback(),
            writerpack_shared::DEFAULT_FALLBACK_KEYWORDS
                .map(String::from)
                .as_slice()
        );
    }
}
