use std::cmp::Ordering;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Attempt, ContestResult};
use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundType {
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
    #[serde(rename = "s")]
    Semi,
    #[serde(rename = "f")]
    Final,
}

impl RoundType {
    pub fn code(self) -> &'static str {
        match self {
            Self::First => "1",
            Self::Second => "2",
            Self::Third => "3",
            Self::Semi => "s",
            Self::Final => "f",
        }
    }
}

impl FromStr for RoundType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Self::First),
            "2" => Ok(Self::Second),
            "3" => Ok(Self::Third),
            "s" => Ok(Self::Semi),
            "f" => Ok(Self::Final),
            other => Err(StorageError::InvalidData(format!(
                "Unknown round type: {}",
                other
            ))),
        }
    }
}

/// How a round's attempts are turned into a ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundFormat {
    #[serde(rename = "1")]
    BestOf1,
    #[serde(rename = "2")]
    BestOf2,
    #[serde(rename = "3")]
    BestOf3,
    #[serde(rename = "m")]
    Mean,
    #[serde(rename = "a")]
    Average,
}

impl RoundFormat {
    pub fn code(self) -> &'static str {
        match self {
            Self::BestOf1 => "1",
            Self::BestOf2 => "2",
            Self::BestOf3 => "3",
            Self::Mean => "m",
            Self::Average => "a",
        }
    }

    pub fn attempts(self) -> usize {
        match self {
            Self::BestOf1 => 1,
            Self::BestOf2 => 2,
            Self::BestOf3 | Self::Mean => 3,
            Self::Average => 5,
        }
    }

    /// Whether results in this format are ranked by their average
    pub fn ranks_by_average(self) -> bool {
        matches!(self, Self::Mean | Self::Average)
    }

    /// Derives `(best, average)` from a list of attempts.
    ///
    /// Formats without an average report `0` for it; an average that cannot be
    /// computed (too many DNF/DNS attempts, missing attempts) is a DNF.
    pub fn best_and_average(self, attempts: &[Attempt]) -> (i64, i64) {
        let best = attempts
            .iter()
            .filter(|a| a.is_valid())
            .map(|a| a.result)
            .min()
            .unwrap_or(Attempt::DNF);

        let average = match self {
            Self::BestOf1 | Self::BestOf2 | Self::BestOf3 => 0,
            Self::Mean => {
                if attempts.len() == 3 && attempts.iter().all(Attempt::is_valid) {
                    rounded_mean(attempts.iter().map(|a| a.result))
                } else {
                    Attempt::DNF
                }
            }
            Self::Average => {
                let invalid = attempts.iter().filter(|a| !a.is_valid()).count();

                if attempts.len() != 5 || invalid > 1 {
                    Attempt::DNF
                } else {
                    // Invalid attempts count as the worst one
                    let mut sorted: Vec<i64> = attempts
                        .iter()
                        .map(|a| if a.is_valid() { a.result } else { i64::MAX })
                        .collect();
                    sorted.sort_unstable();
                    rounded_mean(sorted[1..4].iter().copied())
                }
            }
        };

        (best, average)
    }

    /// Orders two results the way this format ranks them
    pub fn compare(self, a: &ContestResult, b: &ContestResult) -> Ordering {
        if self.ranks_by_average() {
            compare_values(a.average, b.average).then_with(|| compare_values(a.best, b.best))
        } else {
            compare_values(a.best, b.best)
        }
    }
}

impl FromStr for RoundFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Self::BestOf1),
            "2" => Ok(Self::BestOf2),
            "3" => Ok(Self::BestOf3),
            "m" => Ok(Self::Mean),
            "a" => Ok(Self::Average),
            other => Err(StorageError::InvalidData(format!(
                "Unknown round format: {}",
                other
            ))),
        }
    }
}

fn rounded_mean(values: impl Iterator<Item = i64>) -> i64 {
    let (sum, count) = values.fold((0i128, 0i128), |(sum, count), v| {
        (sum + i128::from(v), count + 1)
    });
    if count == 0 {
        return Attempt::DNF;
    }
    i64::try_from((sum + count / 2) / count).unwrap_or(Attempt::DNF)
}

/// Valid (positive) values first, ascending; everything else after
fn compare_values(a: i64, b: i64) -> Ordering {
    match (a > 0, b > 0) {
        (true, true) => a.cmp(&b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProceedType {
    Number,
    Percentage,
}

impl ProceedType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Percentage => "percentage",
        }
    }
}

impl FromStr for ProceedType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(Self::Number),
            "percentage" => Ok(Self::Percentage),
            other => Err(StorageError::InvalidData(format!(
                "Unknown proceed type: {}",
                other
            ))),
        }
    }
}

/// How many competitors advance to the next round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceedRule {
    #[serde(rename = "type")]
    pub kind: ProceedType,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: Uuid,
    pub competition_id: String,
    pub event_id: String,
    pub date: NaiveDate,
    pub round_type_id: RoundType,
    pub format: RoundFormat,
    /// Absent on the final round of an event
    pub proceed: Option<ProceedRule>,
    pub results: Vec<ContestResult>,
    /// Set until the contest gets published
    pub unpublished: bool,
}

impl Round {
    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn is_final(&self) -> bool {
        self.proceed.is_none()
    }
}
