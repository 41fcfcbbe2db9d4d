//! Remote mirror adapter.
//!
//! The remote mirror is a JSON posts service: listing returns
//! `[{id, title, body}]` and creating accepts `{title, body, userId}`.
//! Posts map onto records as title → text and body → category.

use async_trait::async_trait;
use chrono::Utc;
use quotesync_engine::{Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RemoteConfig;

/// Text given to posts without a usable title.
pub const UNTITLED: &str = "(untitled)";

/// Category given to posts without a usable body.
pub const SERVER_CATEGORY: &str = "server";

/// Remote mirror errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Unavailable(e.to_string())
    }
}

/// Source of truth for every id it knows about.
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Pull at most `limit` records.
    async fn fetch_remote(&self, limit: usize) -> Result<Vec<Record>, RemoteError>;

    /// Create `record` remotely and return its acknowledged form.
    async fn push_record(&self, record: &Record) -> Result<Record, RemoteError>;
}

/// Post as returned by the remote listing.
#[derive(Debug, Deserialize)]
struct RemotePost {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Create request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPost<'a> {
    title: &'a str,
    body: &'a str,
    user_id: u64,
}

/// Create response; only the assigned id matters.
#[derive(Debug, Deserialize)]
struct CreatedPost {
    #[serde(default)]
    id: Option<Value>,
}

/// HTTP implementation of [`RemoteMirror`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    url: String,
    user_id: u64,
    category_max_chars: usize,
}

impl HttpRemote {
    /// Build an adapter whose every request is bounded by the configured timeout.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            user_id: config.user_id,
            category_max_chars: config.category_max_chars,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteMirror for HttpRemote {
    async fn fetch_remote(&self, limit: usize) -> Result<Vec<Record>, RemoteError> {
        tracing::debug!(url = %self.url, limit, "Fetching remote snapshot");

        let response = self
            .client
            .get(&self.url)
            .query(&[("_limit", limit)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RemoteError::Unavailable(format!(
                "fetch failed with status: {}",
                response.status()
            )));
        }

        let posts: Vec<RemotePost> = response.json().await?;
        let now = Utc::now();
        let records: Vec<Record> = posts
            .into_iter()
            .filter_map(|post| map_post(post, now, self.category_max_chars))
            .collect();

        tracing::debug!(count = records.len(), "Fetched remote snapshot");
        Ok(records)
    }

    async fn push_record(&self, record: &Record) -> Result<Record, RemoteError> {
        tracing::debug!(id = %record.id, "Pushing record");

        let response = self
            .client
            .post(&self.url)
            .json(&NewPost {
                title: &record.text,
                body: &record.category,
                user_id: self.user_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RemoteError::Unavailable(format!(
                "push failed with status: {}",
                response.status()
            )));
        }

        let created: CreatedPost = response.json().await?;
        let remote_id = created.id.as_ref().and_then(remote_key).map(RecordId::remote);

        Ok(record.acknowledged(remote_id, Utc::now()))
    }
}

/// Map one remote post to a synced record; posts without an id are skipped.
fn map_post(post: RemotePost, now: Timestamp, category_max_chars: usize) -> Option<Record> {
    let Some(key) = post.id.as_ref().and_then(remote_key) else {
        tracing::debug!("Skipping remote post without id");
        return None;
    };

    let text = post
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED);

    let category = post
        .body
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(SERVER_CATEGORY);

    Some(Record::new_remote(
        RecordId::remote(key),
        text,
        truncate_chars(category, category_max_chars),
        now,
    ))
}

fn remote_key(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// First `max` characters of `value`.
fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
