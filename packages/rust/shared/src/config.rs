//! Application configuration for the Writer's Pack pipeline.
//!
//! User config lives at `~/.writerpack/writerpack.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the
//! environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WriterPackError};
use crate::types::{ResearchPolicy, Role};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "writerpack.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".writerpack";

/// Keywords used when no trend data can be resolved for the day.
pub const DEFAULT_FALLBACK_KEYWORDS: [&str; 8] = [
    "mental health",
    "self-care",
    "anxiety",
    "stress management",
    "mindfulness",
    "emotional wellbeing",
    "teen mental health",
    "burnout",
];

// ---------------------------------------------------------------------------
// Config structs (matching writerpack.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub wordpress: WordPressConfig,

    #[serde(default)]
    pub trends: TrendsConfig,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Name recorded as `created_by` on every pack.
    #[serde(default = "default_created_by")]
    pub created_by: String,

    /// libSQL database holding the keyword cache and pack log.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            created_by: default_created_by(),
            database_path: default_database_path(),
        }
    }
}

fn default_created_by() -> String {
    "writer".into()
}
fn default_database_path() -> String {
    "~/.writerpack/writerpack.db".into()
}

/// `[openai]` section. Backs light generation and the draft role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used for the draft role.
    #[serde(default = "default_openai_model")]
    pub draft_model: String,

    /// Model used for keyword summaries and query derivation.
    #[serde(default = "default_openai_model")]
    pub light_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            draft_model: default_openai_model(),
            light_model: default_openai_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// `[gemini]` section. Backs the retrieval-enabled research role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_gemini_key_env(),
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
        }
    }
}

fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash-latest".into()
}

/// `[search]` section. Site-scoped search for internal links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Env var holding the custom search engine id.
    #[serde(default = "default_search_cx_env")]
    pub engine_id_env: String,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// The publication's own domain; searches are restricted to it.
    #[serde(default = "default_site_domain")]
    pub site_domain: String,

    /// Number of broad thematic queries derived per topic.
    #[serde(default = "default_query_count")]
    pub query_count: usize,

    /// Result cap per query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            engine_id_env: default_search_cx_env(),
            base_url: default_search_base_url(),
            site_domain: default_site_domain(),
            query_count: default_query_count(),
            results_per_query: default_results_per_query(),
        }
    }
}

fn default_search_key_env() -> String {
    "GOOGLE_SEARCH_API_KEY".into()
}
fn default_search_cx_env() -> String {
    "GOOGLE_SEARCH_CX".into()
}
fn default_search_base_url() -> String {
    "https://www.googleapis.com".into()
}
fn default_site_domain() -> String {
    "shadee.care".into()
}
fn default_query_count() -> usize {
    3
}
fn default_results_per_query() -> usize {
    5
}

/// `[wordpress]` section. Draft-post publish target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    /// Site root, e.g. `https://shadee.care`.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_wp_user_env")]
    pub username_env: String,

    #[serde(default = "default_wp_password_env")]
    pub app_password_env: String,
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username_env: default_wp_user_env(),
            app_password_env: default_wp_password_env(),
        }
    }
}

fn default_wp_user_env() -> String {
    "WP_USERNAME".into()
}
fn default_wp_password_env() -> String {
    "WP_APP_PASSWORD".into()
}

/// `[trends]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendsConfig {
    /// Source platforms, each backed by `<source_dir>/<platform>.json`.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Rows older than this many days are ignored.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Cap on keywords kept per platform summary.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Used verbatim when no platform yields keywords.
    #[serde(default = "default_fallback_keywords")]
    pub fallback_keywords: Vec<String>,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            source_dir: default_source_dir(),
            lookback_days: default_lookback_days(),
            max_keywords: default_max_keywords(),
            fallback_keywords: default_fallback_keywords(),
        }
    }
}

fn default_platforms() -> Vec<String> {
    ["google trends", "reddit", "youtube", "tumblr"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_source_dir() -> String {
    "~/.writerpack/trends".into()
}
fn default_lookback_days() -> u32 {
    30
}
fn default_max_keywords() -> usize {
    15
}
fn default_fallback_keywords() -> Vec<String> {
    DEFAULT_FALLBACK_KEYWORDS.into_iter().map(String::from).collect()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    /// What to do when research is unavailable.
    #[serde(default)]
    pub research_policy: ResearchPolicy,
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per external call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,

    /// First backoff delay; doubles per retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            generation_timeout_secs: default_generation_timeout(),
            search_timeout_secs: default_search_timeout(),
            publish_timeout_secs: default_publish_timeout(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_search_timeout() -> u64 {
    15
}
fn default_publish_timeout() -> u64 {
    30
}
fn default_backoff_ms() -> u64 {
    500
}

/// `[publish]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Roles allowed to create draft posts on the publish target.
    #[serde(default = "default_authorized_roles")]
    pub authorized_roles: Vec<Role>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            authorized_roles: default_authorized_roles(),
        }
    }
}

fn default_authorized_roles() -> Vec<Role> {
    vec![Role::Editor, Role::Admin]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.writerpack/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WriterPackError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.writerpack/writerpack.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WriterPackError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        WriterPackError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WriterPackError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WriterPackError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WriterPackError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Read a secret from the named environment variable.
pub fn require_env(var_name: &str, purpose: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(WriterPackError::config(format!(
            "{purpose} not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("research_policy = \"proceed-degraded\""));
        assert!(toml_str.contains("mental health"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.search.query_count, 3);
        assert_eq!(parsed.publish.authorized_roles, vec![Role::Editor, Role::Admin]);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[pipeline]
research_policy = "abort"

[trends]
platforms = ["reddit"]
fallback_keywords = ["exam stress"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.research_policy, ResearchPolicy::Abort);
        assert_eq!(config.trends.platforms, vec!["reddit".to_string()]);
        assert_eq!(config.trends.fallback_keywords, vec!["exam stress".to_string()]);
        assert_eq!(config.trends.lookback_days, 30);
        assert_eq!(config.search.site_domain, "shadee.care");
    }

    #[test]
    fn retry_durations() {
        let retry = RetryConfig::default();
        assert_eq!(retry.generation_timeout(), Duration::from_secs(60));
        assert_eq!(retry.search_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn missing_env_secret_is_config_error() {
        // Unique name to avoid interfering with other tests
        let result = require_env("WP_TEST_NONEXISTENT_KEY_12345", "OpenAI API key");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("OpenAI API key not found"));
    }
}
