//! Reconciliation of the local collection with a remote snapshot.
//!
//! This is the core of determinism. Given the local records and a freshly
//! pulled remote snapshot, [`merge`] produces one merged collection and a
//! summary of what changed. No IO happens here.
//!
//! # Algorithm
//!
//! 1. Index local records by id
//! 2. For each remote record:
//!    - unknown id: insert it (addition)
//!    - same text and category: keep the local record, mark it synced (confirmation)
//!    - anything else: the remote record replaces the local one (conflict + replacement)
//! 3. Local records the snapshot never mentions survive untouched
//!
//! The remote mirror arbitrates every id it knows about, which makes the
//! merge idempotent: merging the same snapshot twice is a no-op the second
//! time.

use crate::{Record, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a remote record was folded into the local collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeAction {
    /// Id unknown locally, remote record inserted
    Added,
    /// Same content on both sides, local record marked synced
    Confirmed,
    /// Content differed, remote record won
    Replaced,
}

/// Counts describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    /// Remote records that were new locally
    pub additions: usize,
    /// Local records overwritten by the remote version
    pub replacements: usize,
    /// Ids whose content differed between the two sides
    pub conflicts: usize,
    /// Ids whose content matched
    pub confirmations: usize,
}

impl MergeSummary {
    fn record(&mut self, action: MergeAction) {
        match action {
            MergeAction::Added => self.additions += 1,
            MergeAction::Confirmed => self.confirmations += 1,
            MergeAction::Replaced => {
                self.conflicts += 1;
                self.replacements += 1;
            }
        }
    }

    /// Whether the merge changed any record content.
    pub fn has_changes(&self) -> bool {
        self.additions > 0 || self.replacements > 0
    }
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The merged collection
    pub records: Vec<Record>,
    /// What happened along the way
    pub summary: MergeSummary,
}

/// Merge a remote snapshot into the local collection.
///
/// Local records keep their positions (replaced or confirmed in place) and
/// additions follow in snapshot order. A duplicate id inside the snapshot is
/// handled against the already merged state.
pub fn merge(local: &[Record], remote: &[Record]) -> MergeResult {
    let mut records: Vec<Record> = local.to_vec();
    let mut index: HashMap<RecordId, usize> = HashMap::with_capacity(local.len() + remote.len());
    for (position, record) in records.iter().enumerate() {
        index.entry(record.id.clone()).or_insert(position);
    }

    let mut summary = MergeSummary::default();

    for incoming in remote {
        let action = match index.get(&incoming.id).copied() {
            None => {
                index.insert(incoming.id.clone(), records.len());
                records.push(incoming.clone());
                MergeAction::Added
            }
            Some(position) => {
                let existing = &mut records[position];
                if existing.same_content(incoming) {
                    existing.mark_synced();
                    MergeAction::Confirmed
                } else {
                    let mut winner = incoming.clone();
                    winner.mark_synced();
                    *existing = winner;
                    MergeAction::Replaced
                }
            }
        };
        summary.record(action);
    }

    MergeResult { records, summary }
}
