use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Equivalence class of record recognition, ordered from the top tier down
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordCategory {
    #[serde(rename = "WR")]
    World,
    #[serde(rename = "CR")]
    Continental,
    #[serde(rename = "NR")]
    National,
}

impl RecordCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::World => "WR",
            Self::Continental => "CR",
            Self::National => "NR",
        }
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordCategory {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WR" => Ok(Self::World),
            "CR" => Ok(Self::Continental),
            "NR" => Ok(Self::National),
            other => Err(StorageError::InvalidData(format!(
                "Unknown record category: {}",
                other
            ))),
        }
    }
}

/// Entry of the record type catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    /// Label written onto results that break this record, e.g. "WR"
    pub label: String,
    pub category: RecordCategory,
    pub active: bool,
}

/// Best single and average standing for one record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPair {
    pub best: i64,
    pub average: i64,
}

impl RecordPair {
    /// Sentinel for "no record yet"
    pub const NONE: i64 = -1;

    pub fn empty() -> Self {
        Self {
            best: Self::NONE,
            average: Self::NONE,
        }
    }

    /// Whether `value` ties or beats `record`
    pub fn qualifies(value: i64, record: i64) -> bool {
        value > 0 && (record == Self::NONE || value <= record)
    }
}

/// Record standing per category at some point in time
pub type RecordSnapshot = BTreeMap<RecordCategory, RecordPair>;

impl Default for RecordPair {
    fn default() -> Self {
        Self::empty()
    }
}
