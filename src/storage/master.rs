//! Master dataset with field-level merge
//!
//! Every sighting of an entity arrives as a [`RawFieldSet`]. The store keeps one
//! [`MasterRecord`] per id and folds sightings into it field by field:
//!
//! - a known value replaces a missing or unknown one
//! - a known value replaces a known one only at strictly higher quality
//! - an unknown value never replaces anything
//! - an unknown value carries no quality; a known value's recorded quality never decreases
//!
//! Applying the same sighting twice changes nothing the second time, which is what makes
//! re-processing a link after a crash harmless.

use crate::catalog::{Bounds, Tile};
use crate::storage::atomic::write_atomic;
use crate::storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Marker extractors use for a field they could not read
pub const UNKNOWN_MARKER: &str = "unknown";

/// A field value as reported by an extractor
///
/// Serialized as a string, or `null` for [`FieldValue::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum FieldValue {
    /// The sentinel: the field exists on the page but its value could not be read
    #[default]
    Unknown,
    Known(String),
}

impl FieldValue {
    /// Wraps extractor text, mapping blank text and the unknown marker to the sentinel
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_MARKER) {
            Self::Unknown
        } else {
            Self::Known(trimmed.to_string())
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => Self::Known(v),
            None => Self::Unknown,
        }
    }
}

impl From<FieldValue> for Option<String> {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Known(v) => Some(v),
            FieldValue::Unknown => None,
        }
    }
}

/// Where a sighting came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub bounds: Bounds,
    pub zoom: u32,
    pub page_url: String,
}

impl Provenance {
    pub fn from_tile(tile: &Tile, page_url: impl Into<String>) -> Self {
        Self {
            bounds: tile.bounds,
            zoom: tile.zoom,
            page_url: page_url.into(),
        }
    }
}

/// One sighting of an entity, as produced by an extraction adapter
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldSet {
    /// Source-assigned entity id
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
    /// Trustworthiness of this sighting; higher wins
    pub quality: u32,
    pub provenance: Provenance,
}

impl RawFieldSet {
    pub fn new(id: impl Into<String>, quality: u32, provenance: Provenance) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            quality,
            provenance,
        }
    }

    /// Adds a field, builder style
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Returns true if the id cannot identify an entity
    pub fn has_sentinel_id(&self) -> bool {
        FieldValue::from_text(&self.id) == FieldValue::Unknown
    }
}

/// Current best value of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: FieldValue,
    /// Quality of the sighting that set the known value; `None` while the value is unknown
    #[serde(default)]
    pub quality: Option<u32>,
}

impl FieldEntry {
    fn sighted(value: &FieldValue, quality: u32) -> Self {
        Self {
            quality: value.is_known().then_some(quality),
            value: value.clone(),
        }
    }
}

/// Consolidated view of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub fields: BTreeMap<String, FieldEntry>,
    /// Sighting that last improved the record
    pub provenance: Provenance,
}

impl MasterRecord {
    fn from_raw(raw: &RawFieldSet) -> Self {
        let fields = raw
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), FieldEntry::sighted(value, raw.quality)))
            .collect();

        Self {
            fields,
            provenance: raw.provenance.clone(),
        }
    }

    /// Current value of a field
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).map(|entry| &entry.value)
    }

    /// Recorded quality of a field
    pub fn quality(&self, name: &str) -> Option<u32> {
        self.fields.get(name).and_then(|entry| entry.quality)
    }

    /// Folds a sighting into the record, returning the names of fields that changed
    fn apply(&mut self, raw: &RawFieldSet) -> Vec<String> {
        let mut changed = Vec::new();

        for (name, incoming) in &raw.fields {
            let Some(entry) = self.fields.get_mut(name) else {
                self.fields
                    .insert(name.clone(), FieldEntry::sighted(incoming, raw.quality));
                changed.push(name.clone());
                continue;
            };

            if !incoming.is_known() {
                continue;
            }

            // A sentinel carries no quality, so any known value fills it
            let improves = match entry.quality {
                Some(recorded) if entry.value.is_known() => raw.quality > recorded,
                _ => true,
            };
            if improves {
                entry.value = incoming.clone();
                entry.quality = Some(raw.quality);
                changed.push(name.clone());
            }
        }

        if !changed.is_empty() {
            self.provenance = raw.provenance.clone();
        }
        changed
    }
}

/// What a merge did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting of the id
    Inserted,
    /// Listed fields improved
    Updated { fields: Vec<String> },
    /// Nothing improved
    Unchanged,
    /// The sighting had no usable id and was dropped
    Rejected,
}

/// When the store writes itself to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    every: u32,
}

impl PersistPolicy {
    /// Persist after every link that changed the store
    pub fn every_link() -> Self {
        Self { every: 1 }
    }

    /// Persist once at least `merges` changing merges have accumulated
    pub fn every(merges: u32) -> Self {
        Self {
            every: merges.max(1),
        }
    }
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self::every_link()
    }
}

/// Keyed table of master records backed by a JSON file
#[derive(Debug)]
pub struct MasterStore {
    path: PathBuf,
    records: BTreeMap<String, MasterRecord>,
    policy: PersistPolicy,
    unpersisted: u32,
}

impl MasterStore {
    /// Opens the master file at `path`, or starts an empty store if it does not exist
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the master dataset
    /// * `policy` - How often [`MasterStore::persist_if_due`] writes
    ///
    /// # Returns
    ///
    /// * `Ok(MasterStore)` - Store holding every record previously persisted
    /// * `Err(StorageError)` - The file exists but could not be read or decoded
    pub fn open(path: &Path, policy: PersistPolicy) -> StorageResult<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| StorageError::Read {
                path: path.display().to_string(),
                source,
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened master store {} with {} records", path.display(), records.len());

        Ok(Self {
            path: path.to_path_buf(),
            records,
            policy,
            unpersisted: 0,
        })
    }

    /// Folds one sighting into the store
    ///
    /// Only memory changes; see [`MasterStore::persist_if_due`] for durability.
    pub fn merge(&mut self, raw: &RawFieldSet) -> MergeOutcome {
        if raw.has_sentinel_id() {
            tracing::warn!(
                "Dropping record without a usable id from {}",
                raw.provenance.page_url
            );
            return MergeOutcome::Rejected;
        }

        let outcome = match self.records.get_mut(&raw.id) {
            None => {
                self.records
                    .insert(raw.id.clone(), MasterRecord::from_raw(raw));
                MergeOutcome::Inserted
            }
            Some(record) => {
                let fields = record.apply(raw);
                if fields.is_empty() {
                    MergeOutcome::Unchanged
                } else {
                    MergeOutcome::Updated { fields }
                }
            }
        };

        if outcome != MergeOutcome::Unchanged {
            self.unpersisted += 1;
        }
        tracing::trace!("Merged {}: {:?}", raw.id, outcome);
        outcome
    }

    /// Writes the full store to disk, replacing the previous file atomically
    pub fn persist(&mut self) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(&self.records)?;
        write_atomic(&self.path, json.as_bytes())?;
        self.unpersisted = 0;
        Ok(())
    }

    /// Persists if the policy says enough merges have accumulated
    ///
    /// Returns true if a write happened.
    pub fn persist_if_due(&mut self) -> StorageResult<bool> {
        if self.unpersisted >= self.policy.every {
            self.persist()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Persists any merges not yet on disk
    pub fn flush(&mut self) -> StorageResult<()> {
        if self.is_dirty() {
            self.persist()?;
        }
        Ok(())
    }

    /// Returns true if some merge has not reached disk
    pub fn is_dirty(&self) -> bool {
        self.unpersisted > 0
    }

    /// Number of distinct ids
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: &str) -> Option<&MasterRecord> {
        self.records.get(id)
    }

    /// Iterates records in id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MasterRecord)> {
        self.records.iter()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
