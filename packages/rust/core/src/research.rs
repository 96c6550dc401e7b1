//! Research stage: a retrieval-grounded briefing of facts and sources.
//!
//! The research model gathers facts only. Everything creative happens in
//! the writer, which never fetches facts itself.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use url::Url;

use writerpack_shared::{
    AudienceSegment, DroppedSource, ParseQuality, ResearchBriefing, Result, SourceLink, Topic,
    WriterPackError,
};

use crate::capabilities::ResearchModel;
use crate::parse::{SectionSpec, find_urls, is_link_line, split_sections};
use crate::retry::{RetryPolicy, with_retry};

const SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        key: "summary",
        prose: false,
        names: &[
            "research summary",
            "summary",
            "context & research",
            "context and research",
        ],
    },
    SectionSpec {
        key: "sources",
        prose: false,
        names: &[
            "sources used",
            "sources",
            "source list",
            "references",
            "citations",
        ],
    },
];

/// Produces a [`ResearchBriefing`] for a topic.
pub struct Researcher {
    model: Arc<dyn ResearchModel>,
    retry: RetryPolicy,
}

impl Researcher {
    pub fn new(model: Arc<dyn ResearchModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Research `topic` for `audience`, optionally steered by questions.
    ///
    /// Fails with [`WriterPackError::ResearchUnavailable`] when the call
    /// fails after its retry budget or returns nothing at all. A response
    /// without sources is not a failure.
    #[instrument(skip_all, fields(topic = %topic, audience = %audience))]
    pub async fn research(
        &self,
        topic: &Topic,
        audience: AudienceSegment,
        guiding_questions: &[String],
    ) -> Result<ResearchBriefing> {
        let prompt = research_prompt(topic, audience, guiding_questions);
        let prompt = prompt.as_str();
        let model = &self.model;

        let raw = with_retry(&self.retry, "research", move || model.research(prompt))
            .await
            .map_err(|e| WriterPackError::ResearchUnavailable(e.to_string()))?;

        if raw.trim().is_empty() {
            return Err(WriterPackError::ResearchUnavailable(
                "research model returned an empty answer".into(),
            ));
        }

        let parsed = parse_research(&raw);
        if !parsed.dropped.is_empty() {
            warn!(dropped = parsed.dropped.len(), "some research sources were dropped");
        }
        info!(
            sources = parsed.sources.len(),
            quality = ?parsed.quality,
            "research briefing ready"
        );

        Ok(ResearchBriefing {
            topic: topic.clone(),
            audience,
            summary: parsed.summary,
            sources: parsed.sources,
            dropped_sources: parsed.dropped,
            generated_at: Utc::now(),
            quality: parsed.quality,
            degraded: false,
        })
    }
}

fn research_prompt(topic: &Topic, audience: AudienceSegment, questions: &[String]) -> String {
    let mut prompt = format!(
        "You are a meticulous research assistant for a mental health publication \
         written for {audience}.\n\n\
         Topic: \"{topic}\"\n\n\
         Search the web for key facts, recent news, relevant statistics and expert \
         guidance on this topic. Report only what your sources support; do not write \
         the article, invent quotes, or add opinions.\n\n\
         Write a concise summary of 3-5 paragraphs.\n",
        audience = audience.label(),
    );

    let questions: Vec<&str> = questions
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if !questions.is_empty() {
        prompt.push_str("\nMake sure the summary answers these questions:\n");
        for q in questions {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nAfter the summary you MUST add a \"Sources:\" section listing the 3-5 most \
         relevant URLs you used, one per line:\n\n\
         Sources:\n\
         - https://www.example.com/article-1\n\
         - https://www.example.com/news-story-2\n",
    );
    prompt
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Summary and sources recovered from a raw research answer.
#[derive(Debug, Clone)]
pub struct ParsedResearch {
    pub summary: String,
    pub sources: Vec<SourceLink>,
    pub dropped: Vec<DroppedSource>,
    pub quality: ParseQuality,
}

/// Split a research answer into summary and sources.
///
/// With a sources header, URLs are taken from that section and the text
/// before it is the summary. Without one, every URL in the answer counts
/// as a source and non-link lines form the summary. Every URL seen and not
/// kept is recorded in `dropped` with a reason.
pub fn parse_research(raw: &str) -> ParsedResearch {
    let sections = split_sections(raw, SECTIONS);

    let (summary, candidates, mut quality) = match sections.get("sources") {
        Some(block) => {
            let summary = sections
                .get("summary")
                .unwrap_or(&sections.preamble)
                .to_string();
            let mut found = find_urls(block);
            let quality = if found.is_empty() {
                found = find_urls(raw);
                ParseQuality::Heuristic
            } else {
                ParseQuality::Structured
            };
            (summary, found, quality)
        }
        None => {
            let summary = raw
                .lines()
                .filter(|l| !is_link_line(l) && !is_sources_label(l, &sections))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            (summary, find_urls(raw), ParseQuality::Heuristic)
        }
    };

    let mut sources = Vec::new();
    let mut dropped = Vec::new();
    let mut seen = HashSet::new();

    for candidate in candidates {
        let Some(parsed) = Url::parse(&candidate.url).ok().filter(|u| u.host_str().is_some())
        else {
            dropped.push(DroppedSource {
                url: candidate.url,
                reason: "malformed URL".into(),
            });
            continue;
        };
        if !seen.insert(dedup_key(&parsed)) {
            dropped.push(DroppedSource {
                url: candidate.url,
                reason: "duplicate of an earlier source".into(),
            });
            continue;
        }
        let title = candidate
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| host_title(&parsed));
        sources.push(SourceLink {
            url: candidate.url,
            title,
        });
    }

    if summary.is_empty() && sources.is_empty() {
        quality = ParseQuality::Degraded;
    }

    ParsedResearch {
        summary,
        sources,
        dropped,
        quality,
    }
}

/// An empty "Sources:" header with nothing under it.
fn is_sources_label(line: &str, sections: &crate::parse::Sections) -> bool {
    sections.contains("sources")
        && crate::parse::match_header(line, SECTIONS[1].names).is_some_and(|rest| rest.is_empty())
}

fn dedup_key(url: &Url) -> String {
    let mut key = format!(
        "{}{}",
        url.host_str().unwrap_or_default().trim_start_matches("www."),
        url.path().trim_end_matches('/')
    );
    if let Some(q) = url.query() {
        key.push('?');
        key.push_str(q);
    }
    key.to_lowercase()
}

fn host_title(url: &Url) -> String {
    url.host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FnModel;
    use std::time::Duration;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            timeout: Duration::from_millis(100),
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn parses_canonical_answer() {
        let raw = "Exam stress affects most teens.\n\nSleep helps.\n\nSources:\n\
                   - https://www.example.com/article-1\n\
                   - https://www.example.com/news-story-2";
        let parsed = parse_research(raw);
        assert_eq!(parsed.quality, ParseQuality::Structured);
        assert_eq!(parsed.summary, "Exam stress affects most teens.\n\nSleep helps.");
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(parsed.sources[0].url, "https://www.example.com/article-1");
        assert_eq!(parsed.sources[0].title, "example.com");
        assert!(parsed.dropped.is_empty());
    }

    #[test]
    fn tolerates_markdown_headers_and_annotations() {
        let raw = "## Summary\nTeens report more anxiety before exams.\n\n\
                   **SOURCES**\n\
                   1. [APA: Stress in America](https://www.apa.org/news/stress)\n\
                   2.   NHS - https://www.nhs.uk/mental-health/exam-stress/ (exam tips)\n";
        let parsed = parse_research(raw);
        assert_eq!(parsed.quality, ParseQuality::Structured);
        assert_eq!(parsed.summary, "Teens report more anxiety before exams.");
        assert_eq!(parsed.sources[0].title, "APA: Stress in America");
        assert_eq!(parsed.sources[1].url, "https://www.nhs.uk/mental-health/exam-stress/");
        assert_eq!(parsed.sources[1].title, "NHS - (exam tips)");
    }

    #[test]
    fn duplicates_are_recorded_not_silently_dropped() {
        let raw = "Summary text.\nSources:\nhttps://a.org/x\nhttps://www.a.org/x/\nhttps://b.org";
        let parsed = parse_research(raw);
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(parsed.dropped.len(), 1);
        assert_eq!(parsed.dropped[0].url, "https://www.a.org/x/");
        assert!(parsed.dropped[0].reason.contains("duplicate"));
    }

    #[test]
    fn missing_header_falls_back_to_pattern_matching() {
        let raw = "Exam stress is common.\nSee https://example.org/report for data.\n- https://other.org/";
        let parsed = parse_research(raw);
        assert_eq!(parsed.quality, ParseQuality::Heuristic);
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(
            parsed.summary,
            "Exam stress is common.\nSee https://example.org/report for data."
        );
    }

    #[test]
    fn zero_sources_is_not_an_error() {
        let parsed = parse_research("Just a summary with no links.");
        assert!(parsed.sources.is_empty());
        assert_eq!(parsed.summary, "Just a summary with no links.");
        assert_eq!(parsed.quality, ParseQuality::Heuristic);
    }

    #[test]
    fn every_source_appears_verbatim() {
        let raw = "Facts.\nSources:\n* https://x.org/a.\n* <https://y.org/b>\n* https://z.org/c,";
        let parsed = parse_research(raw);
        for s in &parsed.sources {
            assert!(raw.contains(&s.url), "{} not in raw output", s.url);
        }
        assert_eq!(parsed.sources.len(), 3);
    }

    #[test]
    fn empty_sources_header_uses_whole_answer() {
        let raw = "Facts with a link https://x.org/a inline.\nSources:\n(none listed)";
        let parsed = parse_research(raw);
        assert_eq!(parsed.quality, ParseQuality::Heuristic);
        assert_eq!(parsed.sources.len(), 1);
    }

    #[tokio::test]
    async fn research_builds_briefing() {
        let model = Arc::new(FnModel::new(|_, prompt| {
            assert!(prompt.contains("exam stress"));
            assert!(prompt.contains("How common is it?"));
            Ok("Most teens feel it.\nSources:\n- https://example.org/a".into())
        }));
        let researcher = Researcher::new(model, quick_retry());
        let topic = Topic::parse("exam stress").unwrap();

        let briefing = researcher
            .research(
                &topic,
                AudienceSegment::Youth13to18,
                &["How common is it?".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(briefing.summary, "Most teens feel it.");
        assert_eq!(briefing.sources.len(), 1);
        assert!(!briefing.degraded);
    }

    #[tokio::test]
    async fn timeout_after_budget_is_research_unavailable() {
        let model = Arc::new(
            FnModel::new(|_, _| Ok("late".into())).with_delay(Duration::from_millis(400)),
        );
        let researcher = Researcher::new(model.clone(), quick_retry());
        let topic = Topic::parse("exam stress").unwrap();

        let err = researcher
            .research(&topic, AudienceSegment::Youth13to18, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, WriterPackError::ResearchUnavailable(_)));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn empty_answer_is_research_unavailable() {
        let researcher = Researcher::new(Arc::new(FnModel::fixed("  \n")), quick_retry());
        let topic = Topic::parse("exam stress").unwrap();
        let err = researcher
            .research(&topic, AudienceSegment::YoungAdult19to30Plus, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, WriterPackError::ResearchUnavailable(_)));
    }
}
