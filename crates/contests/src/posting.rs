//! Replacing all results of a contest, with record detection and rollback.

use std::cmp::Ordering;

use storage::dto::contest::{EventRequest, PostResultsResponse, ResultRequest};
use storage::error::StorageError;
use storage::models::{
    Contest, ContestEvent, ContestResult, ContestState, RecordType, Round, RoundFormat,
};
use storage::traits::{RecordTypeFilter, Store};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ContestError, Result};
use crate::participants::contest_participants;
use crate::records::{compute_records, set_same_day_records};
use crate::state::check_can_post_results;

/// Assigns 1-based rankings to results already sorted by `format`. Results
/// the format cannot tell apart share a ranking.
pub fn assign_rankings(results: &mut [ContestResult], format: RoundFormat) {
    for i in 0..results.len() {
        let tied = i > 0 && format.compare(&results[i - 1], &results[i]) == Ordering::Equal;
        results[i].ranking = if tied {
            results[i - 1].ranking
        } else {
            i as i32 + 1
        };
    }
}

fn build_result(round: &Round, request: &ResultRequest) -> ContestResult {
    let (best, average) = round.format.best_and_average(&request.attempts);

    ContestResult {
        result_id: Uuid::new_v4(),
        competition_id: round.competition_id.clone(),
        event_id: round.event_id.clone(),
        round_id: round.round_id,
        date: round.date,
        person_ids: request.person_ids.clone(),
        ranking: 0,
        attempts: request.attempts.clone(),
        best,
        average,
        single_records: Vec::new(),
        average_records: Vec::new(),
        unpublished: round.unpublished,
    }
}

/// Builds the contest's events with the posted results in place of the stored
/// ones. Rounds the request does not mention end up without results.
///
/// Everything the request could get wrong is checked here, before any
/// stored result is touched.
fn prepare_events(contest: &Contest, incoming: &[EventRequest]) -> Result<Vec<ContestEvent>> {
    for (i, requested) in incoming.iter().enumerate() {
        if incoming[..i].iter().any(|e| e.event_id == requested.event_id) {
            return Err(ContestError::Rejected(format!(
                "Event {} appears more than once",
                requested.event_id
            )));
        }
        if !contest
            .events
            .iter()
            .any(|e| e.event_id() == requested.event_id)
        {
            return Err(ContestError::Rejected(format!(
                "Event {} is not held at competition {}",
                requested.event_id, contest.competition_id
            )));
        }
    }

    let mut events = contest.events.clone();

    for event in &mut events {
        let requested = incoming.iter().find(|e| e.event_id == event.event_id());

        for round in &mut event.rounds {
            round.results.clear();
        }

        let Some(requested) = requested else {
            continue;
        };

        for round_request in &requested.rounds {
            let round = round_request
                .round_id
                .and_then(|id| event.rounds.iter_mut().find(|r| r.round_id == id))
                .ok_or_else(|| {
                    ContestError::Rejected(format!(
                        "Round {} is not a round of event {}",
                        round_request
                            .round_id
                            .map_or_else(|| "without id".to_string(), |id| id.to_string()),
                        requested.event_id
                    ))
                })?;

            if !round.results.is_empty() {
                return Err(ContestError::Rejected(format!(
                    "Round {} appears more than once",
                    round.round_id
                )));
            }

            let limit = round.format.attempts();
            if let Some(result) = round_request
                .results
                .iter()
                .find(|r| r.attempts.len() > limit)
            {
                return Err(ContestError::Rejected(format!(
                    "Result of {} has {} attempts, the round format allows {}",
                    result.person_ids,
                    result.attempts.len(),
                    limit
                )));
            }

            let mut results: Vec<ContestResult> = round_request
                .results
                .iter()
                .map(|r| build_result(round, r))
                .collect();
            results.sort_by(|a, b| round.format.compare(a, b));
            assign_rankings(&mut results, round.format);
            round.results = results;
        }
    }

    Ok(events)
}

/// Sets the records of one event and stores its results, one same-day batch
/// after the other in date order
async fn write_event<S>(
    store: &S,
    event: &mut ContestEvent,
    record_types: &[RecordType],
) -> Result<()>
where
    S: Store + ?Sized,
{
    let mut snapshot = compute_records(store, event.event_id(), record_types, None)
        .await?
        .unwrap_or_default();

    event.rounds.sort_by_key(|r| r.date);

    let mut start = 0;
    while start < event.rounds.len() {
        let date = event.rounds[start].date;
        let end = event.rounds[start..]
            .iter()
            .position(|r| r.date != date)
            .map_or(event.rounds.len(), |offset| start + offset);

        let batch = &mut event.rounds[start..end];
        let labels = set_same_day_records(batch, &mut snapshot, record_types);
        if labels > 0 {
            info!(
                "{} new records in event {} on {}",
                labels, event.event.event_id, date
            );
        }

        for round in batch.iter() {
            if !round.results.is_empty() {
                store.insert_results(&round.results).await?;
            }
        }

        start = end;
    }

    Ok(())
}

/// Everything after the old results are gone. Any error here is rolled back
/// by the caller.
async fn write_results<S>(store: &S, updated: &mut Contest, current_id: &str) -> Result<()>
where
    S: Store + ?Sized,
{
    let record_types = store
        .get_record_types(RecordTypeFilter { active: Some(true) })
        .await?;

    for event in &mut updated.events {
        write_event(store, event, &record_types).await?;
    }

    updated.participants = contest_participants(&updated.events).len() as i32;
    updated.state = ContestState::Ongoing;

    store.save_contest(current_id, updated).await?;
    Ok(())
}

async fn restore_results<S>(
    store: &S,
    competition_id: &str,
    previous: &[ContestResult],
) -> std::result::Result<(), StorageError>
where
    S: Store + ?Sized,
{
    store.delete_results(competition_id).await?;
    if !previous.is_empty() {
        store.insert_results(previous).await?;
    }
    Ok(())
}

/// Replaces every result of `contest` with the posted ones.
///
/// On success the contest moves to `Ongoing` with a recomputed participant
/// count, and `contest` is updated in place. On failure after the old results
/// were deleted, they are restored as they were and `contest` is left alone.
pub async fn post_results<S>(
    store: &S,
    contest: &mut Contest,
    incoming: &[EventRequest],
) -> Result<PostResultsResponse>
where
    S: Store + ?Sized,
{
    check_can_post_results(contest.state)?;

    let competition_id = contest.competition_id.clone();
    let mut updated = contest.clone();
    updated.events = prepare_events(contest, incoming)?;

    let previous = store.find_results(&competition_id).await?;
    let deleted = store.delete_results(&competition_id).await?;
    debug!("Deleted {} old results of {}", deleted, competition_id);

    if let Err(e) = write_results(store, &mut updated, &competition_id).await {
        warn!(
            "Posting results of {} failed, restoring {} previous results: {}",
            competition_id,
            previous.len(),
            e
        );

        if let Err(rollback_error) = restore_results(store, &competition_id, &previous).await {
            error!(
                "Failed to restore the results of {}: {}",
                competition_id, rollback_error
            );
        }

        return Err(ContestError::Internal(format!(
            "Error while updating competition events: {}",
            e.message()
        )));
    }

    info!(
        "Posted results of {} ({} participants)",
        competition_id, updated.participants
    );

    *contest = updated;

    Ok(PostResultsResponse {
        participants: contest.participants,
        events: contest.events.clone(),
    })
}
