use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Attempt, Contest, ContestEvent, ContestState, ContestType, ParticipantIds, Person,
    ProceedRule, RecordSnapshot, RoundFormat, RoundType,
};

/// Payload for creating a contest, and for updating one.
///
/// On update the payload describes the desired contest; fields the contest's
/// state does not allow to change are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ContestRequest {
    #[validate(length(
        min = 1,
        max = 64,
        message = "Competition ID must be between 1 and 64 characters"
    ))]
    #[validate(custom(function = "validate_competition_id"))]
    pub competition_id: String,

    #[validate(length(
        min = 1,
        max = 120,
        message = "Name must be between 1 and 120 characters"
    ))]
    pub name: String,

    pub contest_type: ContestType,

    #[validate(length(min = 1, max = 255))]
    pub city: String,

    #[validate(length(min = 1, max = 255))]
    pub venue: String,

    #[validate(length(max = 255))]
    pub address: Option<String>,

    #[validate(length(equal = 2, message = "Country ID must be an ISO2 code"))]
    pub country_id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,

    pub start_date: NaiveDate,

    pub end_date: Option<NaiveDate>,

    /// Person ids of the organizers
    #[serde(default)]
    pub organizers: Vec<i32>,

    #[validate(email(message = "Contact must be an email address"))]
    pub contact: Option<String>,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    #[validate(range(min = 1, message = "Competitor limit must be at least 1"))]
    pub competitor_limit: Option<i32>,

    #[validate(length(min = 1))]
    pub main_event_id: String,

    #[validate(nested)]
    pub events: Vec<EventRequest>,
}

/// An event of the contest with its rounds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EventRequest {
    #[validate(length(min = 1, max = 32))]
    pub event_id: String,

    #[validate(nested)]
    pub rounds: Vec<RoundRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RoundRequest {
    /// Identity of an already stored round; new rounds leave it out
    pub round_id: Option<Uuid>,

    pub date: NaiveDate,

    pub round_type_id: RoundType,

    pub format: RoundFormat,

    pub proceed: Option<ProceedRule>,

    #[serde(default)]
    #[validate(nested)]
    pub results: Vec<ResultRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResultRequest {
    #[validate(custom(function = "validate_person_ids"))]
    pub person_ids: ParticipantIds,

    #[validate(
        length(min = 1, max = 5, message = "A result must have 1 to 5 attempts"),
        custom(function = "validate_attempts")
    )]
    pub attempts: Vec<Attempt>,
}

/// Outcome of posting a contest's results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResultsResponse {
    pub participants: i32,
    pub events: Vec<ContestEvent>,
}

/// Public view of a contest
#[derive(Debug, Clone, Serialize)]
pub struct ContestData {
    pub contest: Contest,
    /// Filled once the results have started being posted
    pub persons: Vec<Person>,
}

/// Moderator view of a contest, including the records valid at its start
#[derive(Debug, Clone, Serialize)]
pub struct ContestModData {
    pub contest: Contest,
    pub persons: Vec<Person>,
    /// Records per event; `None` when no record type is active
    pub records: BTreeMap<String, Option<RecordSnapshot>>,
}

/// Summary row used by contest listings
#[derive(Debug, Clone, Serialize)]
pub struct ContestListItem {
    pub competition_id: String,
    pub name: String,
    pub contest_type: ContestType,
    pub state: ContestState,
    pub city: String,
    pub country_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub participants: i32,
}

impl From<&Contest> for ContestListItem {
    fn from(contest: &Contest) -> Self {
        Self {
            competition_id: contest.competition_id.clone(),
            name: contest.name.clone(),
            contest_type: contest.contest_type,
            state: contest.state,
            city: contest.city.clone(),
            country_id: contest.country_id.clone(),
            start_date: contest.start_date,
            end_date: contest.end_date,
            participants: contest.participants,
        }
    }
}

fn validate_competition_id(competition_id: &str) -> Result<(), validator::ValidationError> {
    let is_valid = competition_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_uppercase() || c.is_ascii_digit());

    if is_valid {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_competition_id"))
    }
}

fn validate_person_ids(person_ids: &ParticipantIds) -> Result<(), validator::ValidationError> {
    if person_ids.is_empty() {
        return Err(validator::ValidationError::new("missing_person_ids"));
    }
    if person_ids.iter().any(|id| id < 1) {
        return Err(validator::ValidationError::new("invalid_person_id"));
    }

    Ok(())
}

fn validate_attempts(attempts: &[Attempt]) -> Result<(), validator::ValidationError> {
    if attempts
        .iter()
        .any(|a| a.result < Attempt::DNS || a.result > Attempt::MAX)
    {
        return Err(validator::ValidationError::new("attempt_out_of_range"));
    }

    Ok(())
}

impl ContestRequest {
    /// Additional validation that requires multiple fields
    pub fn validate_dates(&self) -> Result<(), &'static str> {
        if let Some(end) = self.end_date
            && end < self.start_date
        {
            return Err("End date must be on or after start date");
        }

        Ok(())
    }
}
