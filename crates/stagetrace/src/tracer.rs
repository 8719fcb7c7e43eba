//! The mergeable stage tracer.
//!
//! Stages keep the order in which they were first touched. Records keep call
//! order within their stage. Merging re-homes incoming stages into the
//! receiver's own first-seen order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, TraceError};
use crate::types::{Record, Stage, record};

/// Ordered stages plus a name -> position lookup.
///
/// Every name in `index` points at the stage of that name in `stages`.
#[derive(Debug, Default)]
struct StageBook {
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
}

impl StageBook {
    /// Rebuild a book from decoded stages, folding repeated names into
    /// their first position.
    fn from_stages(decoded: Vec<Stage>) -> Self {
        let mut book = Self::default();
        for Stage { name, records } in decoded {
            let position = book.position(&name);
            book.stages[position].records.extend(records);
        }
        book
    }

    /// Find the stage position, creating the stage at the end if needed.
    fn position(&mut self, name: &str) -> usize {
        if let Some(&position) = self.index.get(name) {
            return position;
        }

        let position = self.stages.len();
        self.index.insert(name.to_string(), position);
        self.stages.push(Stage::new(name));
        tracing::trace!(stage = name, position, "stage created");
        position
    }

    fn append(&mut self, name: &str, record: Record) {
        let position = self.position(name);
        self.stages[position].records.push(record);
    }
}

/// Thread-safe, mergeable execution tracer.
///
/// All access goes through one mutex, so a shared `&Tracer` (or
/// `Arc<Tracer>`) can be recorded into from many threads at once.
#[derive(Debug, Default)]
pub struct Tracer {
    book: Mutex<StageBook>,
}

impl Tracer {
    /// Create an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracer from stages in the given order.
    ///
    /// A stage name that appears more than once is folded into its first
    /// position, with records appended in input order.
    pub fn from_stages(stages: Vec<Stage>) -> Self {
        Self {
            book: Mutex::new(StageBook::from_stages(stages)),
        }
    }

    // Every mutation is a single append, so a poisoned lock still guards a
    // consistent book.
    fn lock(&self) -> MutexGuard<'_, StageBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append the single-key record `{key: value}` to `stage`.
    pub fn record_value(&self, stage: &str, key: impl Into<String>, value: impl Into<Value>) {
        self.record_info(stage, record(key, value));
    }

    /// Append `{key: value}` for any serializable value.
    ///
    /// Fails with [`TraceError::Encoding`] when `value` has no JSON
    /// representation; nothing is recorded in that case.
    pub fn record_serialized(
        &self,
        stage: &str,
        key: impl Into<String>,
        value: &impl Serialize,
    ) -> Result<()> {
        let value = serde_json::to_value(value).map_err(TraceError::Encoding)?;
        self.record_value(stage, key, value);
        Ok(())
    }

    /// Append `record` to `stage`, creating the stage at the next position
    /// if it does not exist yet.
    pub fn record_info(&self, stage: &str, record: Record) {
        self.lock().append(stage, record);
    }

    /// Encode the stage sequence as a JSON array of single-key stage objects.
    ///
    /// Holds the lock for the duration, so the bytes are a consistent
    /// snapshot even while other threads keep recording.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let book = self.lock();
        serde_json::to_vec(&book.stages).map_err(TraceError::Encoding)
    }

    /// Same as [`Tracer::serialize`], indented for humans.
    pub fn serialize_pretty(&self) -> Result<Vec<u8>> {
        let book = self.lock();
        serde_json::to_vec_pretty(&book.stages).map_err(TraceError::Encoding)
    }

    /// Decode bytes produced by [`Tracer::serialize`].
    ///
    /// A bare `null` decodes to an empty tracer.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let stages = decode_stages(data).map_err(TraceError::Decoding)?;
        Ok(Self::from_stages(stages))
    }

    /// Decode `data` and merge it into this tracer.
    ///
    /// On malformed input nothing is merged and the error carries a preview
    /// of the offending bytes.
    pub fn merge_bytes(&self, data: &[u8]) -> Result<()> {
        let stages = decode_stages(data).map_err(|e| TraceError::merge(data, e))?;
        self.merge_tracer(&Self::from_stages(stages));
        Ok(())
    }

    /// Replay every key/value pair of `other` into this tracer.
    ///
    /// Stages of `other` are walked in its order and each pair is appended
    /// as its own single-key record. An incoming stage that already exists
    /// here keeps its existing position; new stages are appended in the
    /// order they are first met. Stages without any pairs are not created.
    pub fn merge_tracer(&self, other: &Tracer) {
        // Snapshot first so merging a tracer into itself cannot deadlock.
        let incoming = other.snapshot();

        let mut book = self.lock();
        let stages_before = book.stages.len();
        let mut replayed = 0usize;
        for stage in incoming {
            for (key, value) in stage.records.into_iter().flatten() {
                book.append(&stage.name, record(key, value));
                replayed += 1;
            }
        }

        tracing::debug!(
            replayed,
            new_stages = book.stages.len() - stages_before,
            "merged tracer"
        );
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.lock().stages.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().stages.is_empty()
    }

    /// Stage names in first-seen order.
    pub fn stage_names(&self) -> Vec<String> {
        self.lock().stages.iter().map(|s| s.name.clone()).collect()
    }

    /// Records of one stage, if it exists.
    pub fn records(&self, stage: &str) -> Option<Vec<Record>> {
        let book = self.lock();
        let position = *book.index.get(stage)?;
        Some(book.stages[position].records.clone())
    }

    /// Copy of all stages in order.
    pub fn snapshot(&self) -> Vec<Stage> {
        self.lock().stages.clone()
    }
}

// `null` is what an empty stage list looks like from encoders that emit a
// missing list as null rather than `[]`.
fn decode_stages(data: &[u8]) -> serde_json::Result<Vec<Stage>> {
    let stages: Option<Vec<Stage>> = serde_json::from_slice(data)?;
    Ok(stages.unwrap_or_default())
}

impl Clone for Tracer {
    fn clone(&self) -> Self {
        Self::from_stages(self.snapshot())
    }
}

impl PartialEq for Tracer {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot() == other.snapshot()
    }
}

impl Serialize for Tracer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.lock().stages.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tracer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let stages = Option::<Vec<Stage>>::deserialize(deserializer)?;
        Ok(Self::from_stages(stages.unwrap_or_default()))
    }
}

impl fmt::Display for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.lock().stages).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
