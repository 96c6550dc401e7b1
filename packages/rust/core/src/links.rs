//! Internal link suggestions from the publication's own site.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use writerpack_shared::{InternalLinkSuggestion, Result, SourceLink, Topic, WriterPackError};

use crate::capabilities::{SiteSearch, TextGenerator};
use crate::parse::parse_list;
use crate::retry::{RetryPolicy, with_retry};

const QUERY_SYSTEM: &str = "You help editors find related articles on their own website. \
Answer with a JSON array of short search queries and nothing else.";

/// Longest query accepted from the model.
const MAX_QUERY_CHARS: usize = 80;

/// Tuning for [`LinkSuggester`].
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub site_domain: String,
    pub query_count: usize,
    pub results_per_query: usize,
    pub generation_retry: RetryPolicy,
    pub search_retry: RetryPolicy,
}

/// Suggestions plus whether any step fell back.
#[derive(Debug, Clone, Default)]
pub struct LinkSuggestions {
    pub suggestions: Vec<InternalLinkSuggestion>,
    pub degraded: bool,
}

impl LinkSuggestions {
    /// Empty, degraded suggestions for when the whole stage is lost.
    pub fn unavailable() -> Self {
        Self {
            suggestions: Vec::new(),
            degraded: true,
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.suggestions.iter().map(|s| s.candidates.len()).sum()
    }
}

/// Derives thematic queries from a topic and searches the site for each.
pub struct LinkSuggester {
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn SiteSearch>,
    settings: LinkSettings,
}

impl LinkSuggester {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SiteSearch>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            generator,
            search,
            settings,
        }
    }

    /// Never fails: a failed query contributes an empty candidate list and
    /// a failed query derivation falls back to the topic itself.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn suggest(&self, topic: &Topic) -> LinkSuggestions {
        let (queries, mut degraded) = match self.derive_queries(topic).await {
            Ok(queries) => (queries, false),
            Err(e) => {
                warn!(error = %e, "query derivation failed, searching for the topic itself");
                (vec![topic.as_str().to_string()], true)
            }
        };

        let mut seen = HashSet::new();
        let mut suggestions = Vec::with_capacity(queries.len());

        for query in queries {
            let candidates = match self.search_query(&query).await {
                Ok(links) => links
                    .into_iter()
                    .filter(|l| seen.insert(normalize_url(&l.url)))
                    .collect(),
                Err(e) => {
                    warn!(query = %query, error = %e, "site search failed");
                    degraded = true;
                    Vec::new()
                }
            };
            suggestions.push(InternalLinkSuggestion { query, candidates });
        }

        let out = LinkSuggestions {
            suggestions,
            degraded,
        };
        info!(
            queries = out.suggestions.len(),
            candidates = out.candidate_count(),
            degraded,
            "internal links suggested"
        );
        out
    }

    async fn derive_queries(&self, topic: &Topic) -> Result<Vec<String>> {
        let count = self.settings.query_count.max(1);
        let prompt = format!(
            "Article topic: \"{topic}\"\n\n\
             Suggest {count} broad search queries (2-4 words each) that would find \
             related articles on a youth mental health website. Cover different \
             angles of the topic."
        );
        let prompt = prompt.as_str();
        let generator = &self.generator;
        let raw = with_retry(&self.settings.generation_retry, "link queries", move || {
            generator.complete(QUERY_SYSTEM, prompt)
        })
        .await?;

        let parsed = parse_list(&raw);
        let mut seen = HashSet::new();
        let queries: Vec<String> = parsed
            .items
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && q.chars().count() <= MAX_QUERY_CHARS)
            .filter(|q| seen.insert(q.to_lowercase()))
            .take(count)
            .collect();

        if queries.is_empty() {
            return Err(WriterPackError::parse("no search queries in model output"));
        }
        debug!(?queries, quality = ?parsed.quality, "derived link queries");
        Ok(queries)
    }

    async fn search_query(&self, query: &str) -> Result<Vec<SourceLink>> {
        let site = self.settings.site_domain.as_str();
        let limit = self.settings.results_per_query;
        let search = &self.search;
        let links = with_retry(&self.settings.search_retry, "site search", move || {
            search.search(query, site, limit)
        })
        .await
        .map_err(|e| WriterPackError::LinkSuggestion(format!("'{query}': {e}")))?;

        Ok(links
            .into_iter()
            .filter(|l| on_site(&l.url, site))
            .take(limit)
            .collect())
    }
}

/// Whether `url` belongs to `site` or one of its subdomains.
fn on_site(url: &str, site: &str) -> bool {
    let site = site.trim().trim_start_matches("www.").to_lowercase();
    if site.is_empty() {
        return true;
    }
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .is_some_and(|host| {
            let host = host.trim_start_matches("www.");
            host == site || host.ends_with(&format!(".{site}"))
        })
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}
