//! Draft stage: article, title, editorial notes and the social bundle.
//!
//! Tone, length and slang come from [`AUDIENCE_PROFILES`]; nothing else in
//! this module branches on the audience.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use writerpack_shared::{
    ArticleStructure, AudienceSegment, ParseQuality, ResearchBriefing, Result, SocialPlatform,
    SocialPost, StructureDirective, Tone, WriterPackError,
};

use crate::capabilities::DraftModel;
use crate::parse::{SectionSpec, Sections, clean_line, parse_list, split_sections};
use crate::retry::{RetryPolicy, with_retry};

// ---------------------------------------------------------------------------
// Audience profiles
// ---------------------------------------------------------------------------

/// Voice and length policy for one audience segment.
#[derive(Debug)]
pub struct AudienceProfile {
    pub audience: AudienceSegment,
    pub tone: Tone,
    pub voice: &'static str,
    pub slang: &'static str,
    pub min_words: u32,
    pub max_words: u32,
    /// Most trend keywords woven into one draft.
    pub max_keywords: usize,
    /// Phrases that signal the intended tone.
    pub tone_markers: &'static [&'static str],
    /// Used when the model's structure choice cannot be recovered.
    pub default_structure: ArticleStructure,
}

pub static AUDIENCE_PROFILES: [AudienceProfile; 2] = [
    AudienceProfile {
        audience: AudienceSegment::Youth13to18,
        tone: Tone::PeerToPeer,
        voice: "Write like a slightly older friend talking peer-to-peer: warm, honest, \
                never preachy or clinical",
        slang: "Light, current slang is fine when it sounds natural; never force it, and \
                avoid anything crude or that dates quickly",
        min_words: 600,
        max_words: 900,
        max_keywords: 6,
        tone_markers: &["real talk", "you're not alone", "we've all been there"],
        default_structure: ArticleStructure::Listicle,
    },
    AudienceProfile {
        audience: AudienceSegment::YoungAdult19to30Plus,
        tone: Tone::Mentor,
        voice: "Write as a grounded mentor: supportive and practical, speaking to a capable \
                adult juggling study, work and relationships",
        slang: "Keep slang to a minimum; plain, conversational English",
        min_words: 1000,
        max_words: 1500,
        max_keywords: 10,
        tone_markers: &["here's what helps", "it's worth remembering", "give yourself credit"],
        default_structure: ArticleStructure::HowToGuide,
    },
];

pub fn audience_profile(audience: AudienceSegment) -> &'static AudienceProfile {
    match audience {
        AudienceSegment::Youth13to18 => &AUDIENCE_PROFILES[0],
        AudienceSegment::YoungAdult19to30Plus => &AUDIENCE_PROFILES[1],
    }
}

fn structure_guidance(structure: ArticleStructure) -> &'static str {
    match structure {
        ArticleStructure::Listicle => {
            "A short intro, then 5-8 numbered subheadings, each a tip or idea with a \
             short explanation, and a warm closing paragraph."
        }
        ArticleStructure::HowToGuide => {
            "Explain why the problem matters, then walk through clear numbered steps \
             (Step 1, Step 2, ...) the reader can act on today, and finish with what to do \
             if it does not get better."
        }
        ArticleStructure::PersonalStory => {
            "A first-person narrative: the situation, the low point, what changed, and \
             what the reader can take from it. Keep it relatable and hopeful."
        }
        ArticleStructure::CelebrityProfile => {
            "Open with who the person is, cover what they have shared publicly about \
             their mental health (from the briefing only), and draw out lessons for readers."
        }
        ArticleStructure::MythVsFact => {
            "Pair each common myth with the fact that corrects it, using 'Myth:' and \
             'Fact:' subheadings, then close with where to get support."
        }
        ArticleStructure::QAndA => {
            "A short intro, then questions readers actually ask as subheadings, each \
             answered directly and kindly."
        }
    }
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// Everything the Writer produced for one invocation.
#[derive(Debug, Clone)]
pub struct Draft {
    pub title: String,
    pub article_body: String,
    pub structure_used: ArticleStructure,
    /// The structure was inferred rather than reported by the model.
    pub structure_inferred: bool,
    /// One post per platform, in [`SocialPlatform::ALL`] order.
    pub social_posts: Vec<SocialPost>,
    pub social_degraded: bool,
    pub writing_reminders: Vec<String>,
    pub final_checklist: Vec<String>,
    pub tone: Tone,
    pub quality: ParseQuality,
}

const DRAFT_SYSTEM: &str = "You are a specialized SEO writing assistant for Shadee.Care, a \
mental health publication for young people. You write original, supportive articles and \
never invent facts, statistics or quotes.";

const DRAFT_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        key: "structure",
        prose: false,
        names: &["structure used", "chosen structure", "structure"],
    },
    SectionSpec {
        key: "title",
        prose: false,
        names: &["title", "headline"],
    },
    SectionSpec {
        key: "context",
        prose: false,
        names: &["context & research", "context and research"],
    },
    SectionSpec {
        key: "keywords",
        prose: false,
        names: &["important keywords", "keywords"],
    },
    SectionSpec {
        key: "reminders",
        prose: false,
        names: &["writing reminders", "reminders"],
    },
    SectionSpec {
        key: "article",
        prose: true,
        names: &["1st draft", "first draft", "article body", "article", "draft"],
    },
    SectionSpec {
        key: "checklist",
        prose: false,
        names: &["final draft checklist", "final checklist", "checklist"],
    },
    SectionSpec {
        key: "facebook",
        prose: false,
        names: &["facebook post", "facebook"],
    },
    SectionSpec {
        key: "instagram",
        prose: false,
        names: &["instagram caption", "instagram post", "instagram"],
    },
    SectionSpec {
        key: "tiktok",
        prose: false,
        names: &["tiktok caption", "tiktok post", "tiktok", "tik tok"],
    },
];

const POST_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        key: "hashtags",
        prose: false,
        names: &["hashtags", "tags"],
    },
    SectionSpec {
        key: "script",
        prose: false,
        names: &["video script", "script"],
    },
];

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[\p{L}\p{N}_]+").expect("valid regex"));

/// Writes the article and social bundle from a briefing and keywords.
pub struct Writer {
    model: Arc<dyn DraftModel>,
    retry: RetryPolicy,
}

impl Writer {
    pub fn new(model: Arc<dyn DraftModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Produce a draft.
    ///
    /// Fails with [`WriterPackError::Writer`] when `keywords` is empty, the
    /// draft call fails, or its answer contains no article. Missing social
    /// posts are repaired or synthesized, never left out.
    #[instrument(skip_all, fields(topic = %briefing.topic, audience = %audience, directive = %directive))]
    pub async fn write(
        &self,
        briefing: &ResearchBriefing,
        keywords: &[String],
        audience: AudienceSegment,
        directive: StructureDirective,
    ) -> Result<Draft> {
        if keywords.is_empty() {
            return Err(WriterPackError::Writer("no keywords supplied".into()));
        }
        let profile = audience_profile(audience);

        let prompt = draft_prompt(briefing, keywords, profile, directive);
        let raw = self
            .call("draft", &prompt)
            .await
            .map_err(|e| WriterPackError::Writer(e.to_string()))?;

        let sections = split_sections(&raw, DRAFT_SECTIONS);
        let (article_body, title, quality) = extract_article(&sections, &raw, briefing);
        if article_body.is_empty() {
            return Err(WriterPackError::Writer(
                "draft answer contained no article".into(),
            ));
        }

        let (structure_used, structure_inferred) = resolve_structure(
            directive,
            sections.get("structure"),
            &article_body,
            profile,
        );

        let mut posts: Vec<Option<SocialPost>> = SocialPlatform::ALL
            .iter()
            .map(|p| social_from_sections(*p, &sections))
            .collect();

        if posts.iter().any(Option::is_none) {
            self.repair_social(&mut posts, &title, &article_body, keywords)
                .await;
        }

        let social_posts: Vec<SocialPost> = SocialPlatform::ALL
            .iter()
            .zip(posts)
            .map(|(platform, post)| {
                post.unwrap_or_else(|| {
                    warn!(platform = %platform, "synthesizing missing social post");
                    synthesize_post(*platform, &title, &article_body, keywords)
                })
            })
            .collect();
        let social_degraded = social_posts.iter().any(|p| p.degraded);

        let draft = Draft {
            title,
            writing_reminders: sections.get("reminders").map(list_items).unwrap_or_default(),
            final_checklist: sections.get("checklist").map(list_items).unwrap_or_default(),
            article_body,
            structure_used,
            structure_inferred,
            social_posts,
            social_degraded,
            tone: profile.tone,
            quality,
        };

        info!(
            structure = %draft.structure_used,
            inferred = draft.structure_inferred,
            words = draft.article_body.split_whitespace().count(),
            social_degraded,
            "draft written"
        );
        Ok(draft)
    }

    async fn call(&self, operation: &str, prompt: &str) -> Result<String> {
        let model = &self.model;
        with_retry(&self.retry, operation, move || model.draft(DRAFT_SYSTEM, prompt)).await
    }

    /// One chained call for just the missing posts. Failure leaves them
    /// missing for synthesis.
    async fn repair_social(
        &self,
        posts: &mut [Option<SocialPost>],
        title: &str,
        body: &str,
        keywords: &[String],
    ) {
        let missing: Vec<SocialPlatform> = SocialPlatform::ALL
            .iter()
            .zip(posts.iter())
            .filter(|(_, p)| p.is_none())
            .map(|(platform, _)| *platform)
            .collect();
        debug!(?missing, "requesting missing social posts");

        let prompt = social_repair_prompt(&missing, title, body, keywords);
        let raw = match self.call("social repair", &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "social post repair failed");
                return;
            }
        };

        let sections = split_sections(&raw, DRAFT_SECTIONS);
        for (slot, platform) in posts.iter_mut().zip(SocialPlatform::ALL) {
            if slot.is_none() {
                *slot = social_from_sections(platform, &sections);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn draft_prompt(
    briefing: &ResearchBriefing,
    keywords: &[String],
    profile: &AudienceProfile,
    directive: StructureDirective,
) -> String {
    let mut prompt = format!(
        "Topic: \"{topic}\"\n\
         Audience: {audience}\n\
         Voice: {voice}. Phrases like {markers} fit this voice.\n\
         Slang: {slang}.\n\
         Length: {min}-{max} words.\n\n",
        topic = briefing.topic,
        audience = profile.audience.label(),
        voice = profile.voice,
        markers = profile
            .tone_markers
            .iter()
            .map(|m| format!("\"{m}\""))
            .collect::<Vec<_>>()
            .join(", "),
        slang = profile.slang,
        min = profile.min_words,
        max = profile.max_words,
    );

    prompt.push_str("STRUCTURE\n");
    match directive {
        StructureDirective::Fixed(structure) => {
            prompt.push_str(&format!(
                "Write a {}. {}\n\n",
                structure.name(),
                structure_guidance(structure)
            ));
        }
        StructureDirective::AiDecide => {
            prompt.push_str(
                "Choose the structure that best fits the topic from this list and report \
                 its exact name on the STRUCTURE line:\n",
            );
            for s in ArticleStructure::ALL {
                prompt.push_str(&format!("- {}: {}\n", s.name(), structure_guidance(s)));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!(
        "SEO KEYWORDS\nWeave these keywords naturally into subheadings and paragraphs; \
         do not list them: {}\n\n",
        keywords.join(", ")
    ));

    prompt.push_str("RESEARCH BRIEFING\n");
    if briefing.degraded || briefing.summary.trim().is_empty() {
        prompt.push_str(
            "No research briefing is available. Do not cite statistics, studies or quotes; \
             rely only on widely established, general wellbeing guidance.\n\n",
        );
    } else {
        prompt.push_str(
            "Base every factual claim on this briefing. Do not add facts, numbers or \
             quotes that are not in it.\n",
        );
        prompt.push_str(briefing.summary.trim());
        prompt.push('\n');
        if !briefing.sources.is_empty() {
            prompt.push_str("Sources:\n");
            for s in &briefing.sources {
                prompt.push_str(&format!("- {}: {}\n", s.title, s.url));
            }
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "OUTPUT FORMAT\nUse exactly these headers, each on its own line:\n\
         STRUCTURE: <structure name>\n\
         TITLE: <headline>\n\
         WRITING REMINDERS:\n- <3-5 reminders for the human editor>\n\
         ARTICLE:\n<the full article in Markdown>\n\
         FINAL DRAFT CHECKLIST:\n- <checks before publishing>\n",
    );
    prompt.push_str(SOCIAL_FORMAT);
    prompt
}

const SOCIAL_FORMAT: &str = "FACEBOOK:\n<post of 2-4 sentences>\nHashtags: #tag #tag\n\
INSTAGRAM:\n<caption with line breaks>\nHashtags: #tag #tag\n\
TIKTOK:\n<one-line caption>\nHashtags: #tag #tag\nVideo script: <30-60 second script>\n";

fn social_repair_prompt(
    missing: &[SocialPlatform],
    title: &str,
    body: &str,
    keywords: &[String],
) -> String {
    let excerpt: String = body.chars().take(1500).collect();
    let names: Vec<&str> = missing.iter().map(|p| p.name()).collect();
    format!(
        "Write social media posts promoting this article for: {}.\n\
         Title: {title}\nKeywords: {}\n\nArticle excerpt:\n{excerpt}\n\n\
         Use these headers, each on its own line:\n{SOCIAL_FORMAT}",
        names.join(", "),
        keywords.join(", "),
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Article body, title and how cleanly they were found.
fn extract_article(
    sections: &Sections,
    raw: &str,
    briefing: &ResearchBriefing,
) -> (String, String, ParseQuality) {
    let (mut body, quality) = match sections.get("article") {
        Some(article) => (article.to_string(), ParseQuality::Structured),
        None if sections.sections.is_empty() => (raw.trim().to_string(), ParseQuality::Heuristic),
        None => (sections.preamble.clone(), ParseQuality::Heuristic),
    };

    let mut title = sections
        .get("title")
        .and_then(|t| t.lines().map(clean_line).find(|l| !l.is_empty()))
        .map(|t| t.trim_matches(|c: char| c == '"' || c == '*').to_string());

    // A leading H1 doubles as the title when none was given.
    if let Some(first) = body.lines().next() {
        let trimmed = first.trim();
        if trimmed.starts_with("# ") {
            if title.is_none() {
                title = Some(trimmed.trim_start_matches("# ").trim().to_string());
            }
            body = body.lines().skip(1).collect::<Vec<_>>().join("\n").trim().to_string();
        }
    }

    let title = title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| title_case(briefing.topic.as_str()));
    (body, title, quality)
}

fn list_items(block: &str) -> Vec<String> {
    parse_list(block).items
}

fn social_from_sections(platform: SocialPlatform, sections: &Sections) -> Option<SocialPost> {
    let key = match platform {
        SocialPlatform::Facebook => "facebook",
        SocialPlatform::Instagram => "instagram",
        SocialPlatform::TikTok => "tiktok",
    };
    parse_post(platform, sections.get(key)?)
}

/// Split one platform section into body, hashtags and video script.
fn parse_post(platform: SocialPlatform, block: &str) -> Option<SocialPost> {
    let parts = split_sections(block, POST_SECTIONS);
    let body = parts.preamble.trim().to_string();
    if body.is_empty() {
        return None;
    }

    let mut hashtags: Vec<String> = Vec::new();
    let mut push_tag = |tag: String| {
        if !hashtags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            hashtags.push(tag);
        }
    };
    match parts.get("hashtags") {
        Some(tags) if HASHTAG_RE.is_match(tags) => {
            HASHTAG_RE
                .find_iter(tags)
                .for_each(|m| push_tag(m.as_str().to_string()));
        }
        Some(tags) => tags
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(hashtag)
            .for_each(&mut push_tag),
        None => HASHTAG_RE
            .find_iter(&body)
            .for_each(|m| push_tag(m.as_str().to_string())),
    }

    Some(SocialPost {
        platform,
        body,
        hashtags,
        video_script: parts.get("script").map(str::to_string),
        degraded: false,
    })
}

/// A hashtag from a keyword phrase: `"exam stress"` becomes `#examstress`.
fn hashtag(phrase: &str) -> Option<String> {
    let tag: String = phrase
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if tag.is_empty() {
        None
    } else {
        Some(format!("#{tag}"))
    }
}

// ---------------------------------------------------------------------------
// Structure resolution
// ---------------------------------------------------------------------------

/// The concrete structure of the draft and whether it was inferred.
fn resolve_structure(
    directive: StructureDirective,
    reported: Option<&str>,
    body: &str,
    profile: &AudienceProfile,
) -> (ArticleStructure, bool) {
    if let StructureDirective::Fixed(structure) = directive {
        if let Some(other) = reported.and_then(recognize_structure) {
            if other != structure {
                debug!(requested = %structure, reported = %other, "model reported a different structure");
            }
        }
        return (structure, false);
    }

    if let Some(structure) = reported.and_then(recognize_structure) {
        return (structure, false);
    }

    let inferred = infer_structure(body).unwrap_or(profile.default_structure);
    warn!(structure = %inferred, "structure not reported, inferred from draft");
    (inferred, true)
}

/// Recognize a structure name in free text like `"Listicle - suits the topic"`.
fn recognize_structure(text: &str) -> Option<ArticleStructure> {
    let first_line = text.lines().map(clean_line).find(|l| !l.is_empty())?;
    if let Some(s) = ArticleStructure::from_name(&first_line) {
        return Some(s);
    }
    let head = first_line
        .split(['-', '–', ':', '(', ',', '.', ';'])
        .next()
        .unwrap_or_default();
    if let Some(s) = ArticleStructure::from_name(head) {
        return Some(s);
    }
    let lower = first_line.to_lowercase();
    ArticleStructure::ALL
        .into_iter()
        .find(|s| lower.contains(&s.name().to_lowercase()))
}

static NUMBERED_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:#{1,6}\s*)?(?:\*\*)?\d{1,2}[.)]\s+\S").expect("valid regex")
});
static MYTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:#{1,6}\s*)?(?:\*\*)?myth\b").expect("valid regex")
});
static QUESTION_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:(?:#{1,6}\s*)(?:\*\*)?.+\?(?:\*\*)?\s*$|(?:\*\*)?Q:)").expect("valid regex")
});
static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bstep\s+\d").expect("valid regex"));

/// Guess the structure from the draft's headings.
fn infer_structure(body: &str) -> Option<ArticleStructure> {
    if MYTH_RE.find_iter(body).count() >= 2 {
        return Some(ArticleStructure::MythVsFact);
    }
    if STEP_RE.find_iter(body).count() >= 2 {
        return Some(ArticleStructure::HowToGuide);
    }
    if QUESTION_HEADING_RE.find_iter(body).count() >= 3 {
        return Some(ArticleStructure::QAndA);
    }
    if NUMBERED_HEADING_RE.find_iter(body).count() >= 3 {
        return Some(ArticleStructure::Listicle);
    }
    None
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// A plain post built from the title and keywords, flagged degraded.
fn synthesize_post(
    platform: SocialPlatform,
    title: &str,
    body: &str,
    keywords: &[String],
) -> SocialPost {
    let teaser = teaser(body);
    let hashtags: Vec<String> = keywords.iter().filter_map(|k| hashtag(k)).take(5).collect();

    let (text, video_script) = match platform {
        SocialPlatform::Facebook => (
            format!("{title}\n\n{teaser}\n\nRead the full article on our blog."),
            None,
        ),
        SocialPlatform::Instagram => (format!("{title}\n\n{teaser}\n\nLink in bio."), None),
        SocialPlatform::TikTok => (
            format!("{title}: {teaser}"),
            Some(format!(
                "Hook: {title}\nMain point: {teaser}\nCall to action: full article at the link in bio."
            )),
        ),
    };

    SocialPost {
        platform,
        body: text,
        hashtags,
        video_script,
        degraded: true,
    }
}

/// First prose sentence of the article, capped.
fn teaser(body: &str) -> String {
    let para = body
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(clean_line)
        .unwrap_or_default();
    let sentence = match para.find(['.', '!', '?']) {
        Some(end) => &para[..=end],
        None => para.as_str(),
    };
    sentence.chars().take(200).collect()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
