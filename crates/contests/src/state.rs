//! Contest lifecycle rules: who may move a contest between states, and which
//! fields an update may still touch in a given state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use storage::models::ContestState;

use crate::error::ContestError;
use crate::reconcile::ReconcileReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = ContestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "user" => Ok(Self::User),
            other => Err(ContestError::Rejected(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_privileged(roles: &[Role]) -> bool {
    roles.contains(&Role::Admin)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TransitionOutcome {
    Applied {
        from: ContestState,
        to: ContestState,
    },
    /// The caller may not perform this transition; nothing changed
    Ignored { current: ContestState },
}

/// Decides whether `roles` may move a contest from `current` to `target`.
///
/// The privileged role may set any state. Everyone else may only close an
/// ongoing contest.
pub fn authorize_transition(
    current: ContestState,
    target: ContestState,
    roles: &[Role],
) -> TransitionOutcome {
    let allowed = is_privileged(roles)
        || (current == ContestState::Ongoing && target == ContestState::Finished);

    if allowed {
        TransitionOutcome::Applied {
            from: current,
            to: target,
        }
    } else {
        TransitionOutcome::Ignored { current }
    }
}

/// Whether posting results is allowed in `state`
pub fn check_can_post_results(state: ContestState) -> Result<(), ContestError> {
    if !state.is_at_least(ContestState::Approved) {
        return Err(ContestError::Rejected(
            "You may not post the results for a competition that hasn't been approved".to_string(),
        ));
    }
    if state.is_at_least(ContestState::Finished) {
        return Err(ContestError::Rejected(
            "You may not post the results for a finished competition".to_string(),
        ));
    }
    Ok(())
}

/// Contest fields an update can change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestField {
    CompetitionId,
    CountryId,
    Contact,
    Description,
    Events,
    Name,
    City,
    Venue,
    Address,
    Coordinates,
    StartDate,
    EndDate,
    Organizers,
    CompetitorLimit,
    MainEventId,
}

/// Who may edit a field, and until when
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldGate {
    PrivilegedOnly,
    /// Editable by anyone while the contest is before this state
    Before(ContestState),
}

impl ContestField {
    fn gate(self) -> FieldGate {
        match self {
            Self::CompetitionId | Self::CountryId => FieldGate::PrivilegedOnly,
            Self::Contact | Self::Description | Self::Events => {
                FieldGate::Before(ContestState::Finished)
            }
            Self::Name
            | Self::City
            | Self::Venue
            | Self::Address
            | Self::Coordinates
            | Self::StartDate
            | Self::EndDate
            | Self::Organizers
            | Self::CompetitorLimit
            | Self::MainEventId => FieldGate::Before(ContestState::Ongoing),
        }
    }

    /// Whether an update by `roles` may change this field while the contest
    /// is in `state`
    pub fn is_editable(self, state: ContestState, privileged: bool) -> bool {
        if privileged {
            return true;
        }
        match self.gate() {
            FieldGate::PrivilegedOnly => false,
            FieldGate::Before(limit) => state.is_before(limit),
        }
    }
}

/// What an update did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Fields whose requested value was stored
    pub applied: Vec<ContestField>,
    /// Fields whose requested value differed but the state did not allow it
    pub skipped: Vec<ContestField>,
    /// Set when the event structure was reconciled
    pub events: Option<ReconcileReport>,
}

impl UpdateReport {
    pub(crate) fn record(&mut self, field: ContestField, editable: bool) {
        if editable {
            self.applied.push(field);
        } else {
            self.skipped.push(field);
        }
    }

    /// Stores `requested` in `target` when it differs and `editable` lets the
    /// field through, and notes the outcome
    pub(crate) fn apply<T, F>(
        &mut self,
        field: ContestField,
        editable: F,
        target: &mut T,
        requested: &T,
    ) where
        T: PartialEq + Clone,
        F: Fn(ContestField) -> bool,
    {
        if target == requested {
            return;
        }

        let allowed = editable(field);
        self.record(field, allowed);
        if allowed {
            *target = requested.clone();
        }
    }
}
