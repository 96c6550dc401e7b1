//! Google Programmable Search, restricted to one site.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use writerpack_core::capabilities::SiteSearch;
use writerpack_shared::{Result, SearchConfig, SourceLink, WriterPackError, require_env};

use crate::{build_client, endpoint, status_error, transport_error};

const SERVICE: &str = "search";

/// The API caps `num` at 10.
const MAX_RESULTS: usize = 10;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
    #[serde(default)]
    title: String,
}

pub struct CustomSearch {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

impl CustomSearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let key = require_env(&config.api_key_env, "Search API key")?;
        let cx = require_env(&config.engine_id_env, "Search engine id")?;
        Self::new(&config.base_url, key, cx)
    }
}

#[async_trait]
impl SiteSearch for CustomSearch {
    #[instrument(skip_all, fields(query = %query, site = %site_domain))]
    async fn search(
        &self,
        query: &str,
        site_domain: &str,
        limit: usize,
    ) -> Result<Vec<SourceLink>> {
        let num = limit.clamp(1, MAX_RESULTS).to_string();
        let mut params = vec![
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ];
        if !site_domain.trim().is_empty() {
            params.push(("siteSearch", site_domain));
            params.push(("siteSearchFilter", "i"));
        }

        let response = self
            .client
            .get(endpoint(&self.base_url, "/customsearch/v1"))
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| WriterPackError::parse(format!("{SERVICE} response: {e}")))?;

        let links: Vec<SourceLink> = body
            .items
            .into_iter()
            .filter(|item| Url::parse(&item.link).is_ok())
            .map(|item| {
                let title = item.title.trim();
                SourceLink {
                    title: if title.is_empty() {
                        item.link.clone()
                    } else {
                        title.to_string()
                    },
                    url: item.link,
                }
            })
            .take(limit)
            .collect();

        debug!(results = links.len(), "search complete");
        Ok(links)
    }
}
