use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Attempt, ParticipantIds};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestResult {
    pub result_id: Uuid,
    pub competition_id: String,
    pub event_id: String,
    pub round_id: Uuid,
    /// Same as the date of the round
    pub date: NaiveDate,
    pub person_ids: ParticipantIds,
    pub ranking: i32,
    pub attempts: Vec<Attempt>,
    pub best: i64,
    pub average: i64,
    /// Labels of the record types this result's single broke
    pub single_records: Vec<String>,
    /// Labels of the record types this result's average broke
    pub average_records: Vec<String>,
    pub unpublished: bool,
}

impl ContestResult {
    pub fn has_valid_best(&self) -> bool {
        self.best > 0
    }

    pub fn has_valid_average(&self) -> bool {
        self.average > 0
    }

    pub fn clear_records(&mut self) {
        self.single_records.clear();
        self.average_records.clear();
    }
}
