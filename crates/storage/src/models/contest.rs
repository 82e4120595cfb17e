use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ContestEvent, Person};
use crate::error::StorageError;

/// Lifecycle state of a contest.
///
/// The progressing states form a total order (`Created` < `Approved` < `Ongoing`
/// < `Finished` < `Published`). `Cancelled` sits outside that order: it is never
/// "before" or "at least" any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestState {
    Created,
    Approved,
    Ongoing,
    Finished,
    Published,
    Cancelled,
}

impl ContestState {
    /// Position in the progression, `None` for the cancelled branch
    pub fn ordinal(self) -> Option<u8> {
        match self {
            Self::Created => Some(10),
            Self::Approved => Some(20),
            Self::Ongoing => Some(30),
            Self::Finished => Some(40),
            Self::Published => Some(50),
            Self::Cancelled => None,
        }
    }

    pub fn is_before(self, other: ContestState) -> bool {
        matches!((self.ordinal(), other.ordinal()), (Some(a), Some(b)) if a < b)
    }

    pub fn is_at_least(self, other: ContestState) -> bool {
        matches!((self.ordinal(), other.ordinal()), (Some(a), Some(b)) if a >= b)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Ongoing => "ongoing",
            Self::Finished => "finished",
            Self::Published => "published",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ContestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContestState {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "approved" => Ok(Self::Approved),
            "ongoing" => Ok(Self::Ongoing),
            "finished" => Ok(Self::Finished),
            "published" => Ok(Self::Published),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StorageError::InvalidData(format!(
                "Unknown contest state: {}",
                other
            ))),
        }
    }
}

/// Single-day meetup or multi-day competition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestType {
    Meetup,
    Competition,
}

impl ContestType {
    pub fn is_multi_day(self) -> bool {
        matches!(self, Self::Competition)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meetup => "meetup",
            Self::Competition => "competition",
        }
    }
}

impl FromStr for ContestType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meetup" => Ok(Self::Meetup),
            "competition" => Ok(Self::Competition),
            other => Err(StorageError::InvalidData(format!(
                "Unknown contest type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub competition_id: String,
    pub name: String,
    pub contest_type: ContestType,
    pub state: ContestState,
    pub city: String,
    pub venue: String,
    pub address: Option<String>,
    pub country_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub organizers: Vec<Person>,
    pub created_by: i32,
    pub contact: Option<String>,
    pub description: Option<String>,
    pub competitor_limit: Option<i32>,
    pub main_event_id: String,
    /// Cached number of distinct participants, recomputed on every results post
    pub participants: i32,
    pub events: Vec<ContestEvent>,
}

impl Contest {
    pub fn has_results(&self) -> bool {
        self.events.iter().any(ContestEvent::has_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progression_order() {
        assert!(ContestState::Created.is_before(ContestState::Approved));
        assert!(ContestState::Ongoing.is_before(ContestState::Finished));
        assert!(!ContestState::Finished.is_before(ContestState::Finished));
        assert!(ContestState::Published.is_at_least(ContestState::Finished));
    }

    #[test]
    fn test_cancelled_is_outside_progression() {
        assert!(!ContestState::Cancelled.is_before(ContestState::Finished));
        assert!(!ContestState::Cancelled.is_at_least(ContestState::Created));
        assert!(!ContestState::Created.is_before(ContestState::Cancelled));
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!("Ongoing".parse::<ContestState>().unwrap(), ContestState::Ongoing);
        assert!("closed".parse::<ContestState>().is_err());
    }
}
