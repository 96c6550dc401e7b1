//! Shared types, error model, and configuration for the Writer's Pack pipeline.
//!
//! This crate is the foundation depended on by all other writerpack crates.
//! It provides:
//! - [`WriterPackError`], the unified error type
//! - Domain types ([`Topic`], [`ResearchBriefing`], [`WriterPack`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_FALLBACK_KEYWORDS, DefaultsConfig, GeminiConfig, OpenAiConfig,
    PipelineSection, PublishConfig, RetryConfig, SearchConfig, TrendsConfig, WordPressConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    require_env,
};
pub use error::{Result, WriterPackError};
pub use types::{
    ArticleStructure, AudienceSegment, DroppedSource, InternalLinkSuggestion, KeywordCacheEntry,
    KeywordSource, PackMetadata, ParseQuality, ResearchBriefing, ResearchPolicy, Role,
    SocialPlatform, SocialPost, SourceLink, StructureDirective, TOPIC_MAX_CHARS, TOPIC_MIN_CHARS,
    Tone, Topic, WriterPack,
};
