//! Core domain types for the Writer's Pack pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WriterPackError};

/// Shortest topic accepted after normalization.
pub const TOPIC_MIN_CHARS: usize = 3;

/// Longest topic accepted after normalization.
pub const TOPIC_MAX_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A validated article topic: trimmed, whitespace-collapsed, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Normalize and validate raw user input.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let len = normalized.chars().count();

        if len == 0 {
            return Err(WriterPackError::validation("topic must not be empty"));
        }
        if len < TOPIC_MIN_CHARS {
            return Err(WriterPackError::validation(format!(
                "topic must be at least {TOPIC_MIN_CHARS} characters"
            )));
        }
        if len > TOPIC_MAX_CHARS {
            return Err(WriterPackError::validation(format!(
                "topic must be at most {TOPIC_MAX_CHARS} characters (got {len})"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = WriterPackError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

// ---------------------------------------------------------------------------
// AudienceSegment
// ---------------------------------------------------------------------------

/// Reader segment; selects the tone/length/slang policy of the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudienceSegment {
    #[serde(rename = "youth")]
    Youth13to18,
    #[serde(rename = "young-adult")]
    YoungAdult19to30Plus,
}

impl AudienceSegment {
    pub const ALL: [AudienceSegment; 2] = [Self::Youth13to18, Self::YoungAdult19to30Plus];

    /// Stable identifier used in config, storage and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youth13to18 => "youth",
            Self::YoungAdult19to30Plus => "young-adult",
        }
    }

    /// Human-readable label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Youth13to18 => "teenagers aged 13-18",
            Self::YoungAdult19to30Plus => "young adults aged 19-30+",
        }
    }
}

impl fmt::Display for AudienceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudienceSegment {
    type Err = WriterPackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youth" | "teen" | "teens" | "13-18" => Ok(Self::Youth13to18),
            "young-adult" | "young_adult" | "adult" | "19-30" | "19-30+" => {
                Ok(Self::YoungAdult19to30Plus)
            }
            other => Err(WriterPackError::validation(format!(
                "unknown audience segment '{other}' (expected youth or young-adult)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Article structures
// ---------------------------------------------------------------------------

/// A concrete article structure the Writer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleStructure {
    Listicle,
    HowToGuide,
    PersonalStory,
    CelebrityProfile,
    MythVsFact,
    QAndA,
}

impl ArticleStructure {
    pub const ALL: [ArticleStructure; 6] = [
        Self::Listicle,
        Self::HowToGuide,
        Self::PersonalStory,
        Self::CelebrityProfile,
        Self::MythVsFact,
        Self::QAndA,
    ];

    /// Display name, also the name the model is asked to echo back.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Listicle => "Listicle",
            Self::HowToGuide => "How-To Guide",
            Self::PersonalStory => "Personal Story",
            Self::CelebrityProfile => "Celebrity Profile",
            Self::MythVsFact => "Myth vs Fact",
            Self::QAndA => "Q&A",
        }
    }

    /// Stable kebab-case identifier.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Listicle => "listicle",
            Self::HowToGuide => "how-to-guide",
            Self::PersonalStory => "personal-story",
            Self::CelebrityProfile => "celebrity-profile",
            Self::MythVsFact => "myth-vs-fact",
            Self::QAndA => "q-and-a",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Listicle => &["list", "list article", "top tips", "numbered list"],
            Self::HowToGuide => &["how to", "guide", "step by step", "tutorial"],
            Self::PersonalStory => &["story", "narrative", "first person", "lived experience"],
            Self::CelebrityProfile => &["celebrity", "profile", "spotlight"],
            Self::MythVsFact => &["myths", "myth busting", "myth vs fact", "myths and facts"],
            Self::QAndA => &["q and a", "qa", "faq", "questions and answers"],
        }
    }

    /// Tolerant lookup by name, slug or alias (case, punctuation and
    /// spacing insensitive).
    pub fn from_name(raw: &str) -> Option<Self> {
        let wanted = squash(raw);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|s| {
            squash(s.name()) == wanted
                || squash(s.slug()) == wanted
                || s.aliases().iter().any(|a| squash(a) == wanted)
        })
    }
}

impl fmt::Display for ArticleStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase and keep only ASCII alphanumerics ("Q&A" → "qa").
fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Requested structure: a concrete one, or let the model choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDirective {
    Fixed(ArticleStructure),
    AiDecide,
}

impl fmt::Display for StructureDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(s) => write!(f, "{s}"),
            Self::AiDecide => f.write_str("AI decides"),
        }
    }
}

impl FromStr for StructureDirective {
    type Err = WriterPackError;

    fn from_str(s: &str) -> Result<Self> {
        let key = squash(s);
        if matches!(key.as_str(), "aidecide" | "auto" | "letgptdecideforme" | "letaidecide") {
            return Ok(Self::AiDecide);
        }
        ArticleStructure::from_name(s)
            .map(Self::Fixed)
            .ok_or_else(|| {
                WriterPackError::validation(format!(
                    "unknown article structure '{s}' (expected one of: {}, ai-decide)",
                    ArticleStructure::ALL.map(|s| s.slug()).join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Trend keywords
// ---------------------------------------------------------------------------

/// A day-scoped summary of trending keywords for one source platform.
///
/// Identity is `(cache_date, source_platform)`. Entries are replaced as a
/// whole, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCacheEntry {
    /// Calendar day (service-local) this summary is valid for.
    pub cache_date: NaiveDate,
    /// Platform the raw rows came from (e.g. `reddit`).
    pub source_platform: String,
    /// Summarized keywords, most relevant first.
    pub keywords: Vec<String>,
    /// Number of raw rows the summary was computed from.
    pub raw_row_count: usize,
    /// When the summary was written.
    pub created_at: DateTime<Utc>,
}

/// Where the keywords handed to the Writer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeywordSource {
    /// Every platform was served from today's cache.
    Cache,
    /// At least one platform was summarized during this invocation.
    Summarized,
    /// Trend data was unavailable; the generic list was used.
    Fallback,
}

impl KeywordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Summarized => "summarized",
            Self::Fallback => "fallback",
        }
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// How much structure a tolerant parser managed to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseQuality {
    /// The expected sections were found.
    Structured,
    /// Sections were missing; content was recovered by pattern matching.
    Heuristic,
    /// Nothing usable was recovered, or the stage was skipped.
    Degraded,
}

/// A URL with a human-readable title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub url: String,
    pub title: String,
}

/// A source URL that was seen in raw output but not kept, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedSource {
    pub url: String,
    pub reason: String,
}

/// Factual summary and sources produced by the research stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchBriefing {
    pub topic: Topic,
    pub audience: AudienceSegment,
    pub summary: String,
    /// Sources in the order they appeared in the raw response.
    pub sources: Vec<SourceLink>,
    /// Sources seen but not kept (duplicates, malformed).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_sources: Vec<DroppedSource>,
    pub generated_at: DateTime<Utc>,
    pub quality: ParseQuality,
    /// True when this briefing stands in for a failed research call.
    pub degraded: bool,
}

impl ResearchBriefing {
    /// An explicitly empty briefing used when research is unavailable and
    /// the pipeline proceeds in degraded mode.
    pub fn unavailable(topic: Topic, audience: AudienceSegment) -> Self {
        Self {
            topic,
            audience,
            summary: String::new(),
            sources: Vec::new(),
            dropped_sources: Vec::new(),
            generated_at: Utc::now(),
            quality: ParseQuality::Degraded,
            degraded: true,
        }
    }
}

/// What to do when the research stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchPolicy {
    /// Draft anyway from an empty, degraded briefing.
    #[default]
    ProceedDegraded,
    /// Stop the invocation and report the research stage.
    Abort,
}

impl ResearchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProceedDegraded => "proceed-degraded",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for ResearchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchPolicy {
    type Err = WriterPackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proceed-degraded" | "proceed" | "degraded" => Ok(Self::ProceedDegraded),
            "abort" => Ok(Self::Abort),
            other => Err(WriterPackError::validation(format!(
                "unknown research policy '{other}' (expected proceed-degraded or abort)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal links
// ---------------------------------------------------------------------------

/// Candidate internal links found for one thematic query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLinkSuggestion {
    pub query: String,
    pub candidates: Vec<SourceLink>,
}

// ---------------------------------------------------------------------------
// Social posts
// ---------------------------------------------------------------------------

/// Social platforms every pack carries a post for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Facebook,
    Instagram,
    TikTok,
}

impl SocialPlatform {
    pub const ALL: [SocialPlatform; 3] = [Self::Facebook, Self::Instagram, Self::TikTok];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A ready-to-post social snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPost {
    pub platform: SocialPlatform,
    pub body: String,
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_script: Option<String>,
    /// True when the post was synthesized rather than written by the model.
    #[serde(default)]
    pub degraded: bool,
}

/// Tone of voice applied to a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    PeerToPeer,
    Mentor,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerToPeer => "peer-to-peer",
            Self::Mentor => "mentor",
        }
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Editorial role of the person running the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Writer,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Writer => "writer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WriterPackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "writer" => Ok(Self::Writer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            other => Err(WriterPackError::validation(format!("unknown role '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// WriterPack
// ---------------------------------------------------------------------------

/// Provenance and degradation flags recorded alongside a pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackMetadata {
    /// Time-sortable pack identifier.
    pub pack_id: Uuid,
    pub tone: Tone,
    pub keyword_source: KeywordSource,
    /// Research policy in force for this invocation.
    pub research_policy: ResearchPolicy,
    pub research_quality: ParseQuality,
    pub draft_quality: ParseQuality,
    /// Research failed and the draft was written without a briefing.
    pub research_degraded: bool,
    pub keywords_degraded: bool,
    pub links_degraded: bool,
    pub social_degraded: bool,
    /// The structure was inferred rather than reported by the model.
    pub structure_inferred: bool,
    /// Any stage above ran in degraded mode.
    pub degraded: bool,
}

/// The terminal artifact of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterPack {
    pub topic: Topic,
    pub audience: AudienceSegment,
    pub structure_used: ArticleStructure,
    pub title: String,
    pub article_body: String,
    pub keywords_used: Vec<String>,
    pub briefing_sources: Vec<SourceLink>,
    /// Sources research saw but rejected, with the reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_sources: Vec<DroppedSource>,
    pub internal_links: Vec<InternalLinkSuggestion>,
    pub social_posts: Vec<SocialPost>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writing_reminders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub final_checklist: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub metadata: PackMetadata,
}

impl WriterPack {
    /// The post for a given platform.
    pub fn social_post(&self, platform: SocialPlatform) -> Option<&SocialPost> {
        self.social_posts.iter().find(|p| p.platform == platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_trimmed_and_collapsed() {
        let topic = Topic::parse("   exam \n  stress\t").unwrap();
        assert_eq!(topic.as_str(), "exam stress");
    }

    #[test]
    fn topic_rejects_empty_and_oversized() {
        assert!(Topic::parse("   ").is_err());
        assert!(Topic::parse("ab").is_err());
        let long = "a".repeat(TOPIC_MAX_CHARS + 1);
        let err = Topic::parse(&long).unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn topic_deserialization_validates() {
        let ok: Topic = serde_json::from_str(r#""  burnout  ""#).unwrap();
        assert_eq!(ok.as_str(), "burnout");
        assert!(serde_json::from_str::<Topic>(r#""""#).is_err());
    }

    #[test]
    fn audience_parses_aliases() {
        assert_eq!("youth".parse::<AudienceSegment>().unwrap(), AudienceSegment::Youth13to18);
        assert_eq!(
            "19-30+".parse::<AudienceSegment>().unwrap(),
            AudienceSegment::YoungAdult19to30Plus
        );
        assert!("seniors".parse::<AudienceSegment>().is_err());
    }

    #[test]
    fn structure_lookup_is_tolerant() {
        assert_eq!(ArticleStructure::from_name("q&a"), Some(ArticleStructure::QAndA));
        assert_eq!(
            ArticleStructure::from_name("**How to guide**"),
            Some(ArticleStructure::HowToGuide)
        );
        assert_eq!(
            ArticleStructure::from_name("myth-busting"),
            Some(ArticleStructure::MythVsFact)
        );
        assert_eq!(ArticleStructure::from_name("sonnet"), None);
    }

    #[test]
    fn structure_directive_parses_sentinel() {
        assert_eq!(
            "ai-decide".parse::<StructureDirective>().unwrap(),
            StructureDirective::AiDecide
        );
        assert_eq!(
            "Let GPT Decide for Me".parse::<StructureDirective>().unwrap(),
            StructureDirective::AiDecide
        );
        assert_eq!(
            "listicle".parse::<StructureDirective>().unwrap(),
            StructureDirective::Fixed(ArticleStructure::Listicle)
        );
        assert!("haiku".parse::<StructureDirective>().is_err());
    }

    #[test]
    fn research_policy_and_role_parse() {
        assert_eq!("abort".parse::<ResearchPolicy>().unwrap(), ResearchPolicy::Abort);
        assert_eq!(ResearchPolicy::default(), ResearchPolicy::ProceedDegraded);
        assert_eq!("Editor".parse::<Role>().unwrap(), Role::Editor);
        assert!("intern".parse::<Role>().is_err());
    }

    #[test]
    fn unavailable_briefing_is_flagged() {
        let briefing = ResearchBriefing::unavailable(
            Topic::parse("exam stress").unwrap(),
            AudienceSegment::Youth13to18,
        );
        assert!(briefing.degraded);
        assert!(briefing.sources.is_empty());
        assert_eq!(briefing.quality, ParseQuality::Degraded);
    }

    #[test]
    fn cache_entry_serialization() {
        let entry = KeywordCacheEntry {
            cache_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            source_platform: "reddit".into(),
            keywords: vec!["exam stress".into(), "study burnout".into()],
            raw_row_count: 42,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("2026-10-19"));
        let parsed: KeywordCacheEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, entry);
    }
}
