//! Trend rows read from exported JSON files, one per platform.
//!
//! `<dir>/<platform-slug>.json` holds either an array of row objects or an
//! object with a `rows` array. Non-object rows are skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use writerpack_core::capabilities::{TrendRow, TrendSource};
use writerpack_shared::{Result, WriterPackError};

pub struct JsonDirTrendSource {
    dir: PathBuf,
}

impl JsonDirTrendSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `platform`, e.g. `google trends` → `google-trends.json`.
    pub fn path_for(&self, platform: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug(platform)))
    }
}

fn slug(platform: &str) -> String {
    let mut out = String::with_capacity(platform.len());
    for c in platform.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

fn rows_from(value: Value) -> Option<Vec<TrendRow>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("rows") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let total = items.len();
    let rows: Vec<TrendRow> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if rows.len() < total {
        debug!(skipped = total - rows.len(), "skipped non-object trend rows");
    }
    Some(rows)
}

#[async_trait]
impl TrendSource for JsonDirTrendSource {
    #[instrument(skip_all, fields(platform = %platform))]
    async fn fetch_rows(&self, platform: &str) -> Result<Vec<TrendRow>> {
        let path = self.path_for(platform);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "trend export unreadable");
                return Err(WriterPackError::io(&path, e));
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        if matches!(content, std::borrow::Cow::Owned(_)) {
            debug!(path = %path.display(), "replaced invalid UTF-8 in trend export");
        }

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            WriterPackError::parse(format!("{}: {e}", path.display()))
        })?;

        let rows = rows_from(value).ok_or_else(|| {
            WriterPackError::parse(format!(
                "{}: expected an array of rows or an object with `rows`",
                path.display()
            ))
        })?;
        debug!(rows = rows.len(), "trend rows loaded");
        Ok(rows)
    }
}
