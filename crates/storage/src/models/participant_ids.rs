use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StorageError;

/// The ordered list of person ids a result belongs to (more than one for team
/// events).
///
/// Older clients send the ids joined by `;` (e.g. `"5;9"`). That form is only
/// accepted when parsing or deserializing; internally the ids are always a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ParticipantIds(Vec<i32>);

impl ParticipantIds {
    pub const DELIMITER: char = ';';

    pub fn new(ids: Vec<i32>) -> Self {
        Self(ids)
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins the ids back into the legacy delimited form
    pub fn to_delimited(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParticipantIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(&Self::DELIMITER.to_string());
        f.write_str(&joined)
    }
}

impl FromStr for ParticipantIds {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ids = s
            .split(Self::DELIMITER)
            .map(|token| {
                token.trim().parse::<i32>().map_err(|_| {
                    StorageError::InvalidData(format!("Invalid person id '{}' in '{}'", token, s))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(ids))
    }
}

impl From<Vec<i32>> for ParticipantIds {
    fn from(ids: Vec<i32>) -> Self {
        Self(ids)
    }
}

impl<'de> Deserialize<'de> for ParticipantIds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            List(Vec<i32>),
            Delimited(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::List(ids) => Ok(Self(ids)),
            Wire::Delimited(joined) => joined.parse().map_err(serde::de::Error::custom),
        }
    }
}
