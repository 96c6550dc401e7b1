//! HTTP and filesystem implementations of the pipeline capabilities.
//!
//! Each client owns a `reqwest::Client` and maps provider responses onto
//! [`WriterPackError`] so that retry classification works uniformly:
//! transport failures become `Network`, non-success statuses become `Http`.

pub mod gemini;
pub mod openai;
pub mod search;
pub mod trend_source;
pub mod wordpress;

use std::time::Duration;

use reqwest::{Client, Response};
use writerpack_shared::{Result, WriterPackError};

pub use gemini::GeminiResearch;
pub use openai::OpenAiChat;
pub use search::CustomSearch;
pub use trend_source::JsonDirTrendSource;
pub use wordpress::WordPressDrafts;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("WriterPack/", env!("CARGO_PKG_VERSION"));

/// Upper bound on a single request; per-stage timeouts are usually tighter.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Longest error body kept in an `Http` error message.
const MAX_ERROR_BODY: usize = 300;

/// Build a reqwest client with appropriate settings.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
        .build()
        .map_err(|e| WriterPackError::Network(format!("failed to build HTTP client: {e}")))
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn transport_error(service: &str, e: reqwest::Error) -> WriterPackError {
    WriterPackError::Network(format!("{service}: {e}"))
}

/// Turn a non-success response into an `Http` error carrying a body excerpt.
pub(crate) async fn status_error(service: &str, response: Response) -> WriterPackError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body,
    };
    WriterPackError::Http {
        service: service.to_string(),
        status,
        message: message.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.openai.com/", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(endpoint("http://127.0.0.1:3000", "x"), "http://127.0.0.1:3000/x");
    }
}
