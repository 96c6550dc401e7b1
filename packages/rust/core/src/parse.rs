//! Tolerant parsing of free-form model output.
//!
//! Model answers are only loosely shaped by their prompts: headers drift
//! between `## Title`, `**Title:**` and `TITLE`, lists come as JSON, bullets
//! or comma runs. These helpers recover what they can and report how much
//! structure they found.

use std::sync::LazyLock;

use regex::Regex;

use writerpack_shared::ParseQuality;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://(?:[^\s<>()\[\]{}"'`]|\([^()\s]*\))+"#).expect("valid regex")
});

static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\((https?://(?:[^()\s]|\([^()\s]*\))+)\)").expect("valid regex")
});

static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d{1,3}[.)]|\(\d{1,3}\))\s+").expect("valid regex")
});

/// Strip list markers, heading hashes, blockquote markers and emphasis.
pub fn clean_line(line: &str) -> String {
    let mut s = line.trim();
    s = s.trim_start_matches('>').trim_start();
    s = s.trim_start_matches('#').trim_start();
    let s = LIST_MARKER_RE.replace(s, "");
    s.replace("**", "").replace("__", "").trim().to_string()
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// A named section to look for, with accepted spellings.
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub key: &'static str,
    /// The body is free-form Markdown. While inside it, only a bare header
    /// (see [`match_bare_header`]) starts the next section.
    pub prose: bool,
    pub names: &'static [&'static str],
}

/// Output of [`split_sections`].
#[derive(Debug, Default, Clone)]
pub struct Sections {
    /// Text before the first recognized header.
    pub preamble: String,
    /// Recognized sections in order of appearance, keyed by `SectionSpec::key`.
    pub sections: Vec<(&'static str, String)>,
}

impl Sections {
    /// Content of the first section with this key, if non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(k, body)| *k == key && !body.trim().is_empty())
            .map(|(_, body)| body.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sections.iter().any(|(k, _)| *k == key)
    }
}

/// If `line` is a header for one of `names`, return the text after it.
///
/// A header is a line that, after markup is stripped, either equals a name
/// or starts with a name followed by `:`, `-` or `|`. Matching ignores case.
pub fn match_header(line: &str, names: &[&str]) -> Option<String> {
    let cleaned = clean_line(line);
    for name in names {
        let Some(prefix) = cleaned.get(..name.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(name) {
            continue;
        }
        let trimmed = cleaned[name.len()..].trim_start();
        if trimmed.is_empty() {
            return Some(String::new());
        }
        if let Some(stripped) = trimmed
            .strip_prefix(':')
            .or_else(|| trimmed.strip_prefix('-'))
            .or_else(|| trimmed.strip_prefix('|'))
        {
            return Some(stripped.trim().to_string());
        }
    }
    None
}

/// Strict header match used inside a prose section.
///
/// The line must hold nothing but a name, optionally bold and followed by
/// `:`. Markdown headings qualify only when written in capitals, so an
/// in-body `## Instagram: the comparison trap` or `## Checklist` stays body
/// text while `INSTAGRAM:` or `## TIKTOK` still ends the prose.
pub fn match_bare_header(line: &str, names: &[&str]) -> bool {
    let trimmed = line.trim();
    let heading = trimmed.starts_with('#');
    let text = trimmed
        .trim_start_matches('#')
        .replace("**", "")
        .replace("__", "");
    let text = text.trim().trim_end_matches(':').trim_end();
    if heading && text.chars().any(char::is_lowercase) {
        return false;
    }
    names.iter().any(|name| text.eq_ignore_ascii_case(name))
}

/// Split text into the sections named by `specs`.
///
/// Text following a header on the same line becomes the first line of
/// that section's body.
pub fn split_sections(text: &str, specs: &[SectionSpec]) -> Sections {
    let mut out = Sections::default();
    let mut current: Option<(&SectionSpec, Vec<String>)> = None;
    let mut preamble = Vec::new();

    for line in text.lines() {
        let in_prose = current.as_ref().is_some_and(|(spec, _)| spec.prose);
        let header = specs.iter().find_map(|spec| {
            if in_prose {
                match_bare_header(line, spec.names).then_some((spec, String::new()))
            } else {
                match_header(line, spec.names).map(|rest| (spec, rest))
            }
        });

        match header {
            Some((spec, rest)) => {
                if let Some((open, lines)) = current.take() {
                    out.sections.push((open.key, join_trimmed(&lines)));
                }
                let mut lines = Vec::new();
                if !rest.is_empty() {
                    lines.push(rest);
                }
                current = Some((spec, lines));
            }
            None => match current.as_mut() {
                Some((_, lines)) => lines.push(line.to_string()),
                None => preamble.push(line.to_string()),
            },
        }
    }

    if let Some((open, lines)) = current {
        out.sections.push((open.key, join_trimmed(&lines)));
    }
    out.preamble = join_trimmed(&preamble);
    out
}

fn join_trimmed(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

/// Items recovered from a list-shaped answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedList {
    pub items: Vec<String>,
    pub quality: ParseQuality,
}

/// Recover a list of short items.
///
/// Tries, in order: a JSON array of strings anywhere in the text, marked
/// list lines (bullets or numbers), then comma/semicolon/newline splitting.
pub fn parse_list(text: &str) -> ParsedList {
    if let Some(items) = json_string_array(text) {
        return ParsedList {
            items: clean_items(items),
            quality: ParseQuality::Structured,
        };
    }

    let marked: Vec<String> = text
        .lines()
        .filter(|l| LIST_MARKER_RE.is_match(l))
        .map(clean_line)
        .collect();
    if !marked.is_empty() {
        return ParsedList {
            items: clean_items(marked),
            quality: ParseQuality::Structured,
        };
    }

    let loose: Vec<String> = text
        .split(|c: char| c == ',' || c == ';' || c == '\n')
        .map(clean_line)
        .collect();
    let items = clean_items(loose);
    let quality = if items.is_empty() {
        ParseQuality::Degraded
    } else {
        ParseQuality::Heuristic
    };
    ParsedList { items, quality }
}

fn json_string_array(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&text[start..=end]).ok()
}

fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| {
            s.trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

/// A URL found in text, with whatever title the surrounding text offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundUrl {
    pub url: String,
    pub title: Option<String>,
}

/// Every http(s) URL in `text`, in order of appearance.
///
/// Markdown link text becomes the title; otherwise the rest of the line,
/// with separators trimmed, is used when present.
pub fn find_urls(text: &str) -> Vec<FoundUrl> {
    let mut found = Vec::new();
    for line in text.lines() {
        let mut consumed = Vec::new();
        for cap in MD_LINK_RE.captures_iter(line) {
            let (Some(whole), Some(title), Some(url)) = (cap.get(0), cap.get(1), cap.get(2)) else {
                continue;
            };
            consumed.push(whole.range());
            found.push(FoundUrl {
                url: trim_url(url.as_str()).to_string(),
                title: Some(title.as_str().trim().to_string()),
            });
        }

        let bare: Vec<_> = URL_RE
            .find_iter(line)
            .filter(|m| !consumed.iter().any(|r| r.contains(&m.start())))
            .collect();
        let line_title = if bare.len() == 1 {
            line_annotation(line, bare[0].range())
        } else {
            None
        };
        for m in bare {
            found.push(FoundUrl {
                url: trim_url(m.as_str()).to_string(),
                title: line_title.clone(),
            });
        }
    }
    found
}

const URL_TRAILERS: [char; 8] = ['.', ',', ';', ':', '!', '?', '*', '_'];

/// Trailing sentence punctuation and unbalanced closing parentheses are not
/// part of a URL.
fn trim_url(url: &str) -> &str {
    let mut url = url.trim_end_matches(URL_TRAILERS);
    while url.ends_with(')') && url.matches(')').count() > url.matches('(').count() {
        url = url[..url.len() - 1].trim_end_matches(URL_TRAILERS);
    }
    url
}

fn line_annotation(line: &str, url_range: std::ops::Range<usize>) -> Option<String> {
    let mut text = String::with_capacity(line.len());
    text.push_str(&line[..url_range.start]);
    text.push(' ');
    text.push_str(&line[url_range.end..]);
    let collapsed = clean_line(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("()", "");
    let title = collapsed
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '-' | ':' | '|' | '<' | '>' | '–' | '—')
        })
        .to_string();
    if title.chars().any(char::is_alphanumeric) {
        Some(title)
    } else {
        None
    }
}

/// Whether a line is nothing but a (possibly bulleted) URL or link.
pub fn is_link_line(line: &str) -> bool {
    let cleaned = clean_line(line);
    if cleaned.is_empty() {
        return false;
    }
    let without = MD_LINK_RE.replace_all(&cleaned, "");
    let without = URL_RE.replace_all(&without, "");
    without.len() < cleaned.len() && !without.chars().any(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[SectionSpec] = &[
        SectionSpec {
            key: "title",
            prose: false,
            names: &["title"],
        },
        SectionSpec {
            key: "article",
            prose: true,
            names: &["article", "draft"],
        },
    ];

    #[test]
    fn headers_tolerate_markup_and_missing_colons() {
        assert_eq!(match_header("## Title", &["title"]), Some(String::new()));
        assert_eq!(
            match_header("**Title:** Beating exam stress", &["title"]),
            Some("Beating exam stress".into())
        );
        assert_eq!(match_header("TITLE - Hi", &["title"]), Some("Hi".into()));
        assert_eq!(match_header("Titles are hard", &["title"]), None);
        assert_eq!(match_header("Title of the piece is", &["title"]), None);
    }

    #[test]
    fn splits_sections_with_preamble() {
        let text = "Sure! Here you go.\n\n**TITLE:** Calm Before the Test\n\n## Article\nFirst para.\n\nSecond para.";
        let sections = split_sections(text, SPECS);
        assert_eq!(sections.preamble, "Sure! Here you go.");
        assert_eq!(sections.get("title"), Some("Calm Before the Test"));
        assert_eq!(sections.get("article"), Some("First para.\n\nSecond para."));
        assert!(sections.get("missing").is_none());
    }

    #[test]
    fn empty_sections_are_reported_but_not_returned() {
        let sections = split_sections("Title:\nArticle:\nbody", SPECS);
        assert!(sections.contains("title"));
        assert!(sections.get("title").is_none());
        assert_eq!(sections.get("article"), Some("body"));
    }

    #[test]
    fn list_from_json_array() {
        let parsed = parse_list("Here are keywords: [\"exam stress\", \"burnout\"]");
        assert_eq!(parsed.items, vec!["exam stress", "burnout"]);
        assert_eq!(parsed.quality, ParseQuality::Structured);
    }

    #[test]
    fn list_from_bullets_and_numbers() {
        let parsed = parse_list("Keywords:\n- exam stress\n2. **burnout**\n* sleep");
        assert_eq!(parsed.items, vec!["exam stress", "burnout", "sleep"]);
        assert_eq!(parsed.quality, ParseQuality::Structured);
    }

    #[test]
    fn list_from_comma_run() {
        let parsed = parse_list("exam stress, burnout; \"sleep\"");
        assert_eq!(parsed.items, vec!["exam stress", "burnout", "sleep"]);
        assert_eq!(parsed.quality, ParseQuality::Heuristic);
    }

    #[test]
    fn empty_list_is_degraded() {
        let parsed = parse_list("  \n , ");
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.quality, ParseQuality::Degraded);
    }

    #[test]
    fn urls_with_titles() {
        let text = "- [Teen anxiety facts](https://example.org/anxiety)\n\
                    - NIMH: https://www.nimh.nih.gov/health.\n\
                    https://bare.example.com/page";
        let urls = find_urls(text);
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].url, "https://example.org/anxiety");
        assert_eq!(urls[0].title.as_deref(), Some("Teen anxiety facts"));
        assert_eq!(urls[1].url, "https://www.nimh.nih.gov/health");
        assert_eq!(urls[1].title.as_deref(), Some("NIMH"));
        assert_eq!(urls[2].url, "https://bare.example.com/page");
        assert_eq!(urls[2].title, None);
    }

    #[test]
    fn link_lines() {
        assert!(is_link_line("- https://example.org/a"));
        assert!(is_link_line("* [x](https://example.org/a)"));
        assert!(!is_link_line("See https://example.org/a for more"));
        assert!(!is_link_line("plain text"));
    }

    #[test]
    fn urls_keep_balanced_parentheses() {
        let text = "- https://en.wikipedia.org/wiki/Stress_(biology)\n\
                    - [Stress](https://en.wikipedia.org/wiki/Stress_(biology))\n\
                    Background reading (see https://example.org/guide).";
        let urls = find_urls(text);
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].url, "https://en.wikipedia.org/wiki/Stress_(biology)");
        assert_eq!(urls[1].url, "https://en.wikipedia.org/wiki/Stress_(biology)");
        assert_eq!(urls[1].title.as_deref(), Some("Stress"));
        assert_eq!(urls[2].url, "https://example.org/guide");
    }

    #[test]
    fn unbalanced_closing_parenthesis_is_trimmed() {
        assert_eq!(trim_url("https://example.org/a)."), "https://example.org/a");
        assert_eq!(trim_url("https://example.org/a_(b))"), "https://example.org/a_(b)");
        assert_eq!(trim_url("https://example.org/a_(b)"), "https://example.org/a_(b)");
    }

    #[test]
    fn bare_headers_ignore_in_body_headings() {
        assert!(match_bare_header("INSTAGRAM:", &["instagram"]));
        assert!(match_bare_header("**Facebook:**", &["facebook"]));
        assert!(match_bare_header("## TIKTOK", &["tiktok"]));
        assert!(!match_bare_header("## 1. Instagram: the comparison trap", &["instagram"]));
        assert!(!match_bare_header("## Checklist", &["checklist"]));
        assert!(!match_bare_header("Instagram: the comparison trap", &["instagram"]));
    }

    #[test]
    fn prose_sections_end_only_at_bare_headers() {
        const WITH_SOCIAL: &[SectionSpec] = &[
            SectionSpec {
                key: "article",
                prose: true,
                names: &["article"],
            },
            SectionSpec {
                key: "instagram",
                prose: false,
                names: &["instagram"],
            },
        ];
        let text = "ARTICLE:\nIntro.\n## 1. Instagram: the comparison trap\nScrolling hurts.\n\
                    INSTAGRAM:\nReal caption";
        let sections = split_sections(text, WITH_SOCIAL);
        assert_eq!(
            sections.get("article"),
            Some("Intro.\n## 1. Instagram: the comparison trap\nScrolling hurts.")
        );
        assert_eq!(sections.get("instagram"), Some("Real caption"));
    }
}
