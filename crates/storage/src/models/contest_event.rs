use serde::{Deserialize, Serialize};

use super::Round;

/// Entry of the external event catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub event_id: String,
    pub name: String,
    /// Display rank, lower ranks are listed first
    pub rank: i32,
}

/// An event held at a contest together with its rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestEvent {
    pub event: EventDefinition,
    pub rounds: Vec<Round>,
}

impl ContestEvent {
    pub fn event_id(&self) -> &str {
        &self.event.event_id
    }

    pub fn has_results(&self) -> bool {
        self.rounds.iter().any(Round::has_results)
    }
}
