//! Store - the local record collection and its persistence.
//!
//! The store owns the collection in memory and writes the full collection to
//! a [`Storage`] backend after every mutation. Persistence failures never
//! reach the caller: a failed read starts from an empty collection, a failed
//! write leaves the in-memory state authoritative until the next save.

use crate::{
    error::Result,
    reconcile::{merge, MergeSummary},
    snapshot, Record, RecordId, Timestamp,
};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};

/// Durable key holding the encoded record collection.
pub const RECORDS_KEY: &str = "myQuotes";

/// Durable key holding the last selected category filter.
pub const FILTER_KEY: &str = "selectedCategory";

/// Category filter value that matches every record.
pub const ALL_CATEGORIES: &str = "all";

/// A string key-value backend for persisted state.
pub trait Storage: Send {
    /// Read the value stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value stored under `key`.
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }
}

/// In-memory storage, used by tests and embedders without a disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage pre-populated with one entry.
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut storage = Self::new();
        storage.entries.insert(key.into(), value.into());
        storage
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A pending record captured for the push phase, with its slot in the
/// collection.
///
/// Import may leave several records sharing one id, so outcomes are applied
/// to the captured slot rather than to the first record carrying the id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPush {
    pub slot: usize,
    pub record: Record,
}

impl PendingPush {
    /// The remote mirror accepted the record.
    pub fn acknowledged(self, pushed: Record) -> PushOutcome {
        PushOutcome::Acknowledged {
            slot: self.slot,
            local_id: self.record.id,
            pushed,
        }
    }

    /// The push failed at `at`.
    pub fn failed(self, at: Timestamp) -> PushOutcome {
        PushOutcome::Failed {
            slot: self.slot,
            id: self.record.id,
            at,
        }
    }

    /// The retry budget is spent.
    pub fn abandoned(self) -> PushOutcome {
        PushOutcome::Abandoned {
            slot: self.slot,
            id: self.record.id,
        }
    }
}

/// Result of pushing one pending record, as applied back to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The remote mirror accepted the record; `pushed` is its synced form.
    Acknowledged {
        slot: usize,
        local_id: RecordId,
        pushed: Record,
    },
    /// The push failed at `at`; the record stays pending.
    Failed {
        slot: usize,
        id: RecordId,
        at: Timestamp,
    },
    /// The retry budget is spent.
    Abandoned { slot: usize, id: RecordId },
}

/// Counts from applying push outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckSummary {
    pub acknowledged: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Acknowledged records that kept their local id because the remote id
    /// was already taken.
    pub id_collisions: usize,
}

/// The main store holding the local collection.
#[derive(Debug)]
pub struct RecordStore<S> {
    storage: S,
    records: Vec<Record>,
}

impl<S: Storage> RecordStore<S> {
    /// Open a store and restore the last persisted collection.
    pub fn open(storage: S) -> Self {
        let mut store = Self {
            storage,
            records: Vec::new(),
        };
        store.load();
        store
    }

    /// Read the persisted collection, surfacing any failure.
    pub fn try_load(&self) -> Result<Vec<Record>> {
        match self.storage.read(RECORDS_KEY)? {
            Some(json) => snapshot::decode(&json),
            None => Ok(Vec::new()),
        }
    }

    /// Restore the persisted collection, falling back to empty.
    pub fn load(&mut self) -> &[Record] {
        self.records = self.try_load().unwrap_or_default();
        &self.records
    }

    /// Overwrite the persisted collection with the in-memory one.
    pub fn save(&mut self) -> Result<()> {
        let json = snapshot::encode(&self.records)?;
        self.storage.write(RECORDS_KEY, &json)
    }

    fn persist(&mut self) {
        // In-memory state stays authoritative when the backend refuses the write.
        let _ = self.save();
    }

    /// Get the backing storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == *id)
    }

    /// Add a quote authored on this device and persist it.
    pub fn add_local(&mut self, text: &str, category: &str, now: Timestamp) -> Result<Record> {
        let record = Record::new_local(text, category, now)?;
        self.records.push(record.clone());
        self.persist();
        Ok(record)
    }

    /// Snapshot of the pending-write set, in collection order.
    pub fn pending(&self) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    /// The pending-write set with each record's slot, for the push phase.
    pub fn pending_pushes(&self) -> Vec<PendingPush> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_pending())
            .map(|(slot, r)| PendingPush {
                slot,
                record: r.clone(),
            })
            .collect()
    }

    /// Records whose delivery was abandoned.
    pub fn abandoned(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.push.abandoned)
    }

    /// Merge a remote snapshot into the collection and persist the result.
    pub fn merge_remote(&mut self, remote: &[Record]) -> MergeSummary {
        let result = merge(&self.records, remote);
        self.records = result.records;
        self.persist();
        result.summary
    }

    /// Fold the results of a push phase back into the collection.
    ///
    /// Each outcome is applied to the slot its record was captured from, as
    /// long as that slot still holds a pending record with the captured id.
    /// An acknowledged record adopts the remote id unless another record
    /// already holds it, in which case it keeps its local id. The collection
    /// is persisted once at the end.
    pub fn apply_push_outcomes(&mut self, outcomes: Vec<PushOutcome>) -> AckSummary {
        let mut summary = AckSummary::default();
        let mut taken: HashMap<RecordId, usize> = HashMap::new();
        for record in &self.records {
            *taken.entry(record.id.clone()).or_default() += 1;
        }

        for outcome in outcomes {
            match outcome {
                PushOutcome::Acknowledged {
                    slot,
                    local_id,
                    mut pushed,
                } => {
                    let Some(position) = self.locate(slot, &local_id) else {
                        continue;
                    };
                    if pushed.id != local_id {
                        if taken.contains_key(&pushed.id) {
                            pushed.id = local_id.clone();
                            summary.id_collisions += 1;
                        } else {
                            release(&mut taken, &local_id);
                            taken.insert(pushed.id.clone(), 1);
                        }
                    }
                    self.records[position] = pushed;
                    summary.acknowledged += 1;
                }
                PushOutcome::Failed { slot, id, at } => {
                    if let Some(position) = self.locate(slot, &id) {
                        self.records[position].record_failed_push(at);
                        summary.failed += 1;
                    }
                }
                PushOutcome::Abandoned { slot, id } => {
                    if let Some(position) = self.locate(slot, &id) {
                        self.records[position].abandon();
                        summary.abandoned += 1;
                    }
                }
            }
        }

        self.persist();
        summary
    }

    /// Resolve a captured slot to the pending record it still refers to.
    fn locate(&self, slot: usize, id: &RecordId) -> Option<usize> {
        match self.records.get(slot) {
            Some(record) if record.id == *id && record.is_pending() => Some(slot),
            // The collection was replaced since capture
            _ => self
                .records
                .iter()
                .position(|r| r.id == *id && r.is_pending()),
        }
    }

    /// Query records.
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.records)
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.category.as_str()))
            .map(|r| r.category.clone())
            .collect()
    }

    /// Pick a random record.
    pub fn random<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Option<&Record> {
        self.records.choose(rng)
    }

    /// The persisted category filter, if any.
    pub fn selected_category(&self) -> Option<String> {
        self.storage.read(FILTER_KEY).ok().flatten()
    }

    /// The filter to apply: the persisted one while some record still
    /// carries that category, otherwise [`ALL_CATEGORIES`].
    pub fn active_category(&self) -> String {
        match self.selected_category() {
            Some(category) if self.records.iter().any(|r| r.category == category) => category,
            _ => ALL_CATEGORIES.to_string(),
        }
    }

    /// Persist the category filter.
    pub fn set_selected_category(&mut self, category: &str) -> Result<()> {
        self.storage.write(FILTER_KEY, category)
    }

    /// Append every element of an import document.
    ///
    /// Import never merges: an element whose id already exists is appended
    /// next to the existing record. Returns the number of records appended.
    pub fn import_json(&mut self, json: &str, now: Timestamp) -> Result<usize> {
        let imported = snapshot::parse_import(json, now)?;
        let count = imported.len();
        self.records.extend(imported);
        self.persist();
        Ok(count)
    }

    /// Serialize the collection exactly as `save` persists it.
    pub fn export_json(&self) -> Result<String> {
        snapshot::encode(&self.records)
    }
}

fn release(taken: &mut HashMap<RecordId, usize>, id: &RecordId) {
    if let Some(count) = taken.get_mut(id) {
        *count -= 1;
        if *count == 0 {
            taken.remove(id);
        }
    }
}

/// Builder for querying records.
#[derive(Debug)]
pub struct QueryBuilder<'a> {
    records: &'a [Record],
    category: Option<&'a str>,
    pending_only: bool,
}

impl<'a> QueryBuilder<'a> {
    fn new(records: &'a [Record]) -> Self {
        Self {
            records,
            category: None,
            pending_only: false,
        }
    }

    /// Only records in `category`; [`ALL_CATEGORIES`] matches everything.
    pub fn category(mut self, category: &'a str) -> Self {
        self.category = (category != ALL_CATEGORIES).then_some(category);
        self
    }

    /// Only records in the pending-write set.
    pub fn pending_only(mut self) -> Self {
        self.pending_only = true;
        self
    }

    fn matches(&self, record: &Record) -> bool {
        self.category.map_or(true, |c| record.category == c)
            && (!self.pending_only || record.is_pending())
    }

    /// Get all matching records.
    pub fn all(self) -> Vec<&'a Record> {
        self.records.iter().filter(|r| self.matches(r)).collect()
    }

    /// Get the first matching record.
    pub fn first(self) -> Option<&'a Record> {
        self.records.iter().find(|r| self.matches(r))
    }

    /// Count matching records.
    pub fn count(self) -> usize {
        self.records.iter().filter(|r| self.matches(r)).count()
    }
}
