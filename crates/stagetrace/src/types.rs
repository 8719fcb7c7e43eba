//! Stage trace data types.
//!
//! A trace is an ordered list of stages. On the wire each stage is a
//! single-key object mapping the stage name to its ordered records:
//!
//! ```json
//! [
//!   { "stage1": [ {"req": "stage1_req"}, {"resp": "stage1_resp"} ] },
//!   { "stage2": [ {"req": "stage2_req"} ] }
//! ]
//! ```

use std::fmt;

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A single observation: observation key to an arbitrary JSON value.
///
/// Records built by `record_value` hold exactly one key.
pub type Record = Map<String, Value>;

/// Build a single-key record `{key: value}`.
pub fn record(key: impl Into<String>, value: impl Into<Value>) -> Record {
    let mut record = Record::new();
    record.insert(key.into(), value.into());
    record
}

/// A named, ordered bucket of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Stage name, unique within a tracer.
    pub name: String,

    /// Records in append order.
    pub records: Vec<Record>,
}

impl Stage {
    /// Create an empty stage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    /// Append a record and return the stage (builder style).
    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.records)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StageVisitor)
    }
}

struct StageVisitor;

impl<'de> Visitor<'de> for StageVisitor {
    type Value = Stage;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with exactly one stage name mapped to a list of records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Stage, A::Error> {
        let name: String = map
            .next_key()?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &self))?;
        let records: Vec<Record> = map.next_value()?;

        if map.next_key::<IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(2, &self));
        }

        Ok(Stage { name, records })
    }
}
