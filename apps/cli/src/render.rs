//! Plain-text rendering of a Writer's Pack for the terminal.

use writerpack_shared::{SocialPlatform, WriterPack};

pub(crate) fn print_pack(pack: &WriterPack) {
    let meta = &pack.metadata;

    println!();
    println!("# {}", pack.title);
    println!();
    println!("  Topic:     {}", pack.topic);
    println!("  Audience:  {}", pack.audience.label());
    println!(
        "  Structure: {}{}",
        pack.structure_used,
        if meta.structure_inferred { " (inferred)" } else { "" }
    );
    println!("  Tone:      {}", meta.tone.as_str());
    println!(
        "  Keywords:  {} ({})",
        pack.keywords_used.join(", "),
        meta.keyword_source.as_str()
    );
    println!("  Pack id:   {}", meta.pack_id);

    if meta.degraded {
        let mut parts = Vec::new();
        if meta.research_degraded {
            parts.push("research");
        }
        if meta.keywords_degraded {
            parts.push("keywords");
        }
        if meta.links_degraded {
            parts.push("internal links");
        }
        if meta.social_degraded {
            parts.push("social posts");
        }
        if meta.structure_inferred {
            parts.push("structure");
        }
        println!("  Degraded:  {}", parts.join(", "));
    }

    section("Article");
    println!("{}", pack.article_body.trim());

    section("Research sources");
    if pack.briefing_sources.is_empty() {
        println!("  (none: verify every claim before publishing)");
    }
    for source in &pack.briefing_sources {
        println!("  - {} <{}>", source.title, source.url);
    }
    for dropped in &pack.dropped_sources {
        println!("  x <{}> dropped: {}", dropped.url, dropped.reason);
    }

    section("Internal link ideas");
    if pack.internal_links.is_empty() {
        println!("  (none)");
    }
    for suggestion in &pack.internal_links {
        println!("  {}:", suggestion.query);
        if suggestion.candidates.is_empty() {
            println!("    (no matches)");
        }
        for link in &suggestion.candidates {
            println!("    - {} <{}>", link.title, link.url);
        }
    }

    section("Social posts");
    for platform in SocialPlatform::ALL {
        let Some(post) = pack.social_post(platform) else {
            continue;
        };
        println!(
            "  [{platform}]{}",
            if post.degraded { " (template)" } else { "" }
        );
        for line in post.body.lines() {
            println!("    {line}");
        }
        if !post.hashtags.is_empty() {
            println!("    {}", post.hashtags.join(" "));
        }
        if let Some(script) = &post.video_script {
            println!("    Script:");
            for line in script.lines() {
                println!("      {line}");
            }
        }
        println!();
    }

    list_section("Writing reminders", &pack.writing_reminders);
    list_section("Final checklist", &pack.final_checklist);
    println!();
}

fn section(name: &str) {
    println!();
    println!("## {name}");
    println!();
}

fn list_section(name: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    section(name);
    for item in items {
        println!("  - [ ] {item}");
    }
}
