//! Record types for storing quotes.

use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Prefix of identifiers minted on this device.
pub const LOCAL_PREFIX: &str = "local-";

/// Prefix of identifiers assigned by the remote mirror.
pub const REMOTE_PREFIX: &str = "srv-";

/// Origin of a record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Minted locally, never acknowledged by the remote mirror
    Local,
    /// Assigned by the remote mirror
    Remote,
}

/// Identifier of a record, tagged by origin through its prefix.
///
/// Identifiers that carry neither prefix (e.g. arriving through an import)
/// are treated as local.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Mint a fresh local identifier.
    pub fn new_local() -> Self {
        Self(format!("{}{}", LOCAL_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    /// Build the identifier for a key assigned by the remote mirror.
    pub fn remote(key: impl fmt::Display) -> Self {
        Self(format!("{}{}", REMOTE_PREFIX, key))
    }

    /// Where this identifier came from.
    pub fn origin(&self) -> Origin {
        if self.0.starts_with(REMOTE_PREFIX) {
            Origin::Remote
        } else {
            Origin::Local
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for RecordId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Delivery bookkeeping for a record that has not reached the remote mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushState {
    /// Failed push attempts since the last local mutation
    #[serde(default)]
    pub attempts: u32,
    /// When the last failed attempt happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<Timestamp>,
    /// Retry budget exhausted; the record is no longer pushed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub abandoned: bool,
}

impl PushState {
    /// No attempt has failed yet.
    pub fn is_fresh(&self) -> bool {
        *self == Self::default()
    }
}

/// A quote in the local collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier for this record
    pub id: RecordId,
    /// The quote itself
    pub text: String,
    /// Free-form grouping label
    pub category: String,
    /// Advanced on every content mutation
    pub updated_at: Timestamp,
    /// Whether the remote mirror has confirmed this state
    pub synced: bool,
    /// Push retry bookkeeping, omitted while fresh
    #[serde(default, skip_serializing_if = "PushState::is_fresh")]
    pub push: PushState,
}

impl Record {
    /// Create a record authored on this device.
    ///
    /// Text and category are trimmed and must not be empty.
    pub fn new_local(text: &str, category: &str, now: Timestamp) -> Result<Self> {
        Ok(Self {
            id: RecordId::new_local(),
            text: non_empty("text", text)?,
            category: non_empty("category", category)?,
            updated_at: now,
            synced: false,
            push: PushState::default(),
        })
    }

    /// Create a record as reported by the remote mirror.
    pub fn new_remote(
        id: RecordId,
        text: impl Into<String>,
        category: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            category: category.into(),
            updated_at: now,
            synced: true,
            push: PushState::default(),
        }
    }

    /// Whether two records carry the same text and category.
    pub fn same_content(&self, other: &Record) -> bool {
        self.text == other.text && self.category == other.category
    }

    /// Whether this record belongs to the pending-write set.
    pub fn is_pending(&self) -> bool {
        !self.synced && !self.push.abandoned
    }

    /// Mark as confirmed by the remote mirror.
    pub fn mark_synced(&mut self) {
        self.synced = true;
        self.push = PushState::default();
    }

    /// Copy of this record after the remote mirror acknowledged a push.
    pub fn acknowledged(&self, remote_id: Option<RecordId>, now: Timestamp) -> Self {
        let mut record = self.clone();
        if let Some(id) = remote_id {
            record.id = id;
        }
        record.updated_at = now;
        record.mark_synced();
        record
    }

    /// Register a failed push attempt.
    pub fn record_failed_push(&mut self, now: Timestamp) {
        self.push.attempts += 1;
        self.push.last_attempt_at = Some(now);
    }

    /// Stop trying to deliver this record.
    pub fn abandon(&mut self) {
        self.push.abandoned = true;
    }
}

/// Trim a field and reject it when nothing is left.
pub(crate) fn non_empty(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyField(field));
    }
    Ok(trimmed.to_string())
}
