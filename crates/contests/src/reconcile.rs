//! Merges an edited event/round structure into the stored one without ever
//! losing rounds that already hold results.

use serde::Serialize;
use storage::dto::contest::{EventRequest, RoundRequest};
use storage::error::StorageError;
use storage::models::{ContestEvent, EventDefinition, Round};
use storage::traits::{EventCatalog, RoundStore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ContestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChange {
    Created,
    Deleted,
    /// Left out of the request but kept because its rounds hold results
    KeptWithResults,
}

/// Whether a requested field edit took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    Unchanged,
    Applied,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProceedOutcome {
    Unchanged,
    Set,
    Cleared,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "change")]
pub enum RoundChange {
    Created,
    Updated {
        format: FieldOutcome,
        proceed: ProceedOutcome,
    },
    Deleted,
    KeptWithResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventReport {
    pub event_id: String,
    pub change: EventChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub event_id: String,
    pub round_id: Uuid,
    #[serde(flatten)]
    pub change: RoundChange,
}

/// What a reconcile did to the stored structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub events: Vec<EventReport>,
    pub rounds: Vec<RoundReport>,
}

impl ReconcileReport {
    fn event(&mut self, event_id: &str, change: EventChange) {
        self.events.push(EventReport {
            event_id: event_id.to_string(),
            change,
        });
    }

    fn round(&mut self, event_id: &str, round_id: Uuid, change: RoundChange) {
        self.rounds.push(RoundReport {
            event_id: event_id.to_string(),
            round_id,
            change,
        });
    }

    pub fn round_change(&self, round_id: Uuid) -> Option<RoundChange> {
        self.rounds
            .iter()
            .find(|r| r.round_id == round_id)
            .map(|r| r.change)
    }

    pub fn event_change(&self, event_id: &str) -> Option<EventChange> {
        self.events
            .iter()
            .find(|e| e.event_id == event_id)
            .map(|e| e.change)
    }
}

fn structure_error(error: StorageError) -> ContestError {
    ContestError::Internal(format!("Error while updating contest events: {}", error))
}

/// A fresh round without results. New rounds stay unpublished until the
/// contest gets published.
pub(crate) fn new_round(competition_id: &str, event_id: &str, request: &RoundRequest) -> Round {
    Round {
        round_id: Uuid::new_v4(),
        competition_id: competition_id.to_string(),
        event_id: event_id.to_string(),
        date: request.date,
        round_type_id: request.round_type_id,
        format: request.format,
        proceed: request.proceed,
        results: Vec::new(),
        unpublished: true,
    }
}

/// Looks up every requested event in the catalog. An unknown id rejects the
/// request before anything is written.
pub(crate) async fn resolve_events<'a, S>(
    store: &S,
    requests: Vec<&'a EventRequest>,
) -> Result<Vec<(EventDefinition, &'a EventRequest)>>
where
    S: EventCatalog + ?Sized,
{
    let mut resolved = Vec::with_capacity(requests.len());
    for request in requests {
        let event = store
            .get_event_by_id(&request.event_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => {
                    ContestError::Rejected(format!("Event with id {} not found", request.event_id))
                }
                other => structure_error(other),
            })?;
        resolved.push((event, request));
    }

    Ok(resolved)
}

/// Stores all rounds of a resolved event
pub(crate) async fn create_event<S>(
    store: &S,
    competition_id: &str,
    event: EventDefinition,
    request: &EventRequest,
) -> Result<ContestEvent>
where
    S: RoundStore + ?Sized,
{
    let mut rounds = Vec::with_capacity(request.rounds.len());
    for round_request in &request.rounds {
        let round = new_round(competition_id, &event.event_id, round_request);
        store.create_round(&round).await.map_err(structure_error)?;
        rounds.push(round);
    }

    Ok(ContestEvent { event, rounds })
}

/// Applies an edit to a stored round. The round type always changes; the
/// format only while the round has no results.
fn update_round(round: &mut Round, request: &RoundRequest) -> RoundChange {
    round.round_type_id = request.round_type_id;

    let format = if request.format == round.format {
        FieldOutcome::Unchanged
    } else if round.has_results() {
        FieldOutcome::Skipped
    } else {
        round.format = request.format;
        FieldOutcome::Applied
    };

    let proceed = match (request.proceed, round.proceed) {
        (Some(requested), Some(current)) if requested == current => ProceedOutcome::Unchanged,
        // A round that used to be the final one always accepts a proceed rule
        (Some(requested), current) if !round.has_results() || current.is_none() => {
            round.proceed = Some(requested);
            ProceedOutcome::Set
        }
        (Some(_), _) => ProceedOutcome::Skipped,
        (None, Some(_)) => {
            round.proceed = None;
            ProceedOutcome::Cleared
        }
        (None, None) => ProceedOutcome::Unchanged,
    };

    RoundChange::Updated { format, proceed }
}

/// Merges `incoming` into the `stored` events of a contest and persists the
/// structural changes. Returns the merged events ordered by event rank.
///
/// Rounds (and events) holding results are never deleted, even when the
/// request leaves them out. Persistence failures abort with an internal error;
/// there is no compensation for the steps already applied.
pub async fn reconcile_events<S>(
    store: &S,
    competition_id: &str,
    stored: Vec<ContestEvent>,
    incoming: &[EventRequest],
) -> Result<(Vec<ContestEvent>, ReconcileReport)>
where
    S: RoundStore + EventCatalog + ?Sized,
{
    let added: Vec<&EventRequest> = incoming
        .iter()
        .filter(|r| !stored.iter().any(|e| e.event_id() == r.event_id))
        .collect();
    let added = resolve_events(store, added).await?;

    let mut report = ReconcileReport::default();
    let mut events = Vec::with_capacity(stored.len() + added.len());

    // Deletions
    for mut event in stored {
        let event_id = event.event_id().to_string();

        let Some(requested) = incoming.iter().find(|e| e.event_id == event_id) else {
            if event.has_results() {
                warn!(
                    "Keeping event {} of {}: it has results",
                    event_id, competition_id
                );
                report.event(&event_id, EventChange::KeptWithResults);
                events.push(event);
            } else {
                let round_ids: Vec<Uuid> = event.rounds.iter().map(|r| r.round_id).collect();
                store
                    .delete_rounds(&round_ids)
                    .await
                    .map_err(structure_error)?;
                debug!("Deleted event {} of {}", event_id, competition_id);
                report.event(&event_id, EventChange::Deleted);
            }
            continue;
        };

        let mut kept = Vec::with_capacity(event.rounds.len());
        let mut removed = Vec::new();

        for round in event.rounds {
            if requested
                .rounds
                .iter()
                .any(|r| r.round_id == Some(round.round_id))
            {
                kept.push(round);
            } else if round.has_results() {
                warn!(
                    "Keeping round {} of {}: it has results",
                    round.round_id, competition_id
                );
                report.round(&event_id, round.round_id, RoundChange::KeptWithResults);
                kept.push(round);
            } else {
                report.round(&event_id, round.round_id, RoundChange::Deleted);
                removed.push(round.round_id);
            }
        }

        if !removed.is_empty() {
            store.delete_rounds(&removed).await.map_err(structure_error)?;
            debug!(
                "Deleted {} rounds of event {} of {}",
                removed.len(),
                event_id,
                competition_id
            );
        }

        event.rounds = kept;
        events.push(event);
    }

    // Updates
    for requested in incoming {
        let Some(event) = events
            .iter_mut()
            .find(|e| e.event_id() == requested.event_id)
        else {
            continue;
        };

        for round_request in &requested.rounds {
            let existing = round_request
                .round_id
                .and_then(|id| event.rounds.iter_mut().find(|r| r.round_id == id));

            match existing {
                Some(round) => {
                    let change = update_round(round, round_request);
                    store.update_round(round).await.map_err(structure_error)?;
                    if let RoundChange::Updated {
                        format: FieldOutcome::Skipped,
                        ..
                    }
                    | RoundChange::Updated {
                        proceed: ProceedOutcome::Skipped,
                        ..
                    } = change
                    {
                        warn!(
                            "Round {} of {} has results, part of its edit was skipped",
                            round.round_id, competition_id
                        );
                    }
                    report.round(&requested.event_id, round.round_id, change);
                }
                None => {
                    let round = new_round(competition_id, &requested.event_id, round_request);
                    store.create_round(&round).await.map_err(structure_error)?;
                    report.round(&requested.event_id, round.round_id, RoundChange::Created);
                    event.rounds.push(round);
                }
            }
        }
    }

    // Additions
    for (definition, requested) in added {
        let event = create_event(store, competition_id, definition, requested).await?;
        report.event(&requested.event_id, EventChange::Created);
        for round in &event.rounds {
            report.round(&requested.event_id, round.round_id, RoundChange::Created);
        }
        debug!("Added event {} to {}", requested.event_id, competition_id);
        events.push(event);
    }

    events.sort_by_key(|e| e.event.rank);

    Ok((events, report))
}
