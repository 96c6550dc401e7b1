//! WordPress REST client. Creates draft posts only.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use writerpack_core::capabilities::{PublishSink, PublishedDraft};
use writerpack_shared::{Result, WordPressConfig, WriterPackError, require_env};

use crate::{build_client, endpoint, status_error, transport_error};

const SERVICE: &str = "wordpress";

#[derive(Serialize)]
struct NewPost<'a> {
    title: &'a str,
    content: &'a str,
    status: &'static str,
}

#[derive(Deserialize)]
struct CreatedPost {
    id: u64,
    #[serde(default)]
    link: Option<String>,
}

/// Authenticates with an application password.
pub struct WordPressDrafts {
    client: Client,
    site_url: String,
    username: String,
    app_password: String,
}

impl WordPressDrafts {
    pub fn new(
        site_url: impl Into<String>,
        username: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            site_url: site_url.into(),
            username: username.into(),
            app_password: app_password.into(),
        })
    }

    /// `Ok(None)` when no site URL is configured.
    pub fn from_config(config: &WordPressConfig) -> Result<Option<Self>> {
        if config.url.trim().is_empty() {
            return Ok(None);
        }
        let user = require_env(&config.username_env, "WordPress username")?;
        let password = require_env(&config.app_password_env, "WordPress application password")?;
        Self::new(&config.url, user, password).map(Some)
    }
}

#[async_trait]
impl PublishSink for WordPressDrafts {
    #[instrument(skip_all, fields(site = %self.site_url, title = %title))]
    async fn create_draft(&self, title: &str, body: &str) -> Result<PublishedDraft> {
        let response = self
            .client
            .post(endpoint(&self.site_url, "/wp-json/wp/v2/posts"))
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&NewPost {
                title,
                content: body,
                status: "draft",
            })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if response.status() != StatusCode::CREATED {
            return Err(status_error(SERVICE, response).await);
        }

        let post: CreatedPost = response
            .json()
            .await
            .map_err(|e| WriterPackError::parse(format!("{SERVICE} response: {e}")))?;

        info!(post_id = post.id, "draft post created");
        Ok(PublishedDraft {
            id: post.id,
            link: post.link,
        })
    }
}
