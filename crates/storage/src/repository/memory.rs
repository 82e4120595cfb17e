//! In-memory implementation of the collaborator traits.
//!
//! Mirrors the Postgres behavior closely enough for the contest core's tests,
//! including the refusal to delete rounds that hold results, and lets tests
//! inject storage failures.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{
    Contest, ContestEvent, ContestResult, ContestState, EventDefinition, Person, RecordType,
    Round,
};
use crate::traits::{
    ContestFilter, ContestStore, EventCatalog, PersonDirectory, RecordTypeCatalog,
    RecordTypeFilter, ResultStore, ResultsQuery, RoundStore,
};

#[derive(Debug, Default)]
struct Faults {
    /// 1-based index of the next `insert_results` call that fails once
    result_insert_failure_at: Option<usize>,
    fail_all_result_inserts: bool,
    fail_contest_saves: bool,
}

#[derive(Debug, Default)]
struct Inner {
    /// Contest fields only; events are assembled from rounds and results
    contests: Vec<Contest>,
    rounds: Vec<Round>,
    results: Vec<ContestResult>,
    events: HashMap<String, EventDefinition>,
    persons: HashMap<i32, Person>,
    record_types: Vec<RecordType>,
    result_insert_calls: usize,
    faults: Faults,
}

impl Inner {
    fn assemble_events(&self, competition_id: &str) -> Vec<ContestEvent> {
        let mut rounds: Vec<Round> = self
            .rounds
            .iter()
            .filter(|r| r.competition_id == competition_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| r.date);

        let mut events: Vec<ContestEvent> = Vec::new();

        for mut round in rounds {
            round.results = self
                .results
                .iter()
                .filter(|r| r.round_id == round.round_id)
                .cloned()
                .collect();
            round.results.sort_by_key(|r| r.ranking);

            match events
                .iter_mut()
                .find(|e| e.event.event_id == round.event_id)
            {
                Some(event) => event.rounds.push(round),
                None => {
                    let event = self
                        .events
                        .get(&round.event_id)
                        .cloned()
                        .unwrap_or_else(|| EventDefinition {
                            event_id: round.event_id.clone(),
                            name: round.event_id.clone(),
                            rank: i32::MAX,
                        });
                    events.push(ContestEvent {
                        event,
                        rounds: vec![round],
                    });
                }
            }
        }

        events.sort_by_key(|e| e.event.rank);
        events
    }
}

fn injected_failure(operation: &str) -> StorageError {
    StorageError::Database(sqlx::Error::Protocol(format!(
        "injected failure during {}",
        operation
    )))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_event(&self, event: EventDefinition) {
        self.lock().events.insert(event.event_id.clone(), event);
    }

    pub fn add_person(&self, person: Person) {
        self.lock().persons.insert(person.person_id, person);
    }

    pub fn add_record_type(&self, record_type: RecordType) {
        self.lock().record_types.push(record_type);
    }

    /// Stores results directly, bypassing fault injection. Used to seed
    /// historical results of other contests.
    pub fn seed_results(&self, results: Vec<ContestResult>) {
        self.lock().results.extend(results);
    }

    /// Makes the `n`-th call to `insert_results` from now on fail, once
    pub fn fail_nth_result_insert(&self, n: usize) {
        let mut inner = self.lock();
        let calls = inner.result_insert_calls;
        inner.faults.result_insert_failure_at = Some(calls + n);
    }

    /// Makes every following `insert_results` call fail
    pub fn fail_all_result_inserts(&self) {
        self.lock().faults.fail_all_result_inserts = true;
    }

    pub fn fail_contest_saves(&self, fail: bool) {
        self.lock().faults.fail_contest_saves = fail;
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    /// Overwrites the stored state of a contest, bypassing the state machine
    pub fn force_state(&self, competition_id: &str, state: ContestState) -> Result<()> {
        let mut inner = self.lock();
        let contest = inner
            .contests
            .iter_mut()
            .find(|c| c.competition_id == competition_id)
            .ok_or(StorageError::NotFound)?;
        contest.state = state;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContestStore for MemoryStore {
    async fn find_contest(&self, competition_id: &str) -> Result<Option<Contest>> {
        let inner = self.lock();
        let Some(contest) = inner
            .contests
            .iter()
            .find(|c| c.competition_id == competition_id)
        else {
            return Ok(None);
        };

        let mut contest = contest.clone();
        contest.events = inner.assemble_events(competition_id);
        Ok(Some(contest))
    }

    async fn list_contests(&self, filter: &ContestFilter) -> Result<Vec<Contest>> {
        let inner = self.lock();
        let mut contests: Vec<Contest> = inner
            .contests
            .iter()
            .filter(|c| {
                filter
                    .country_id
                    .as_ref()
                    .is_none_or(|country| &c.country_id == country)
            })
            .filter(|c| filter.created_by.is_none_or(|user| c.created_by == user))
            .filter(|c| !filter.visible_only || c.state.ordinal() > ContestState::Created.ordinal())
            .cloned()
            .collect();

        contests.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(contests)
    }

    async fn contest_exists(&self, competition_id: &str) -> Result<bool> {
        Ok(self
            .lock()
            .contests
            .iter()
            .any(|c| c.competition_id == competition_id))
    }

    async fn insert_contest(&self, contest: &Contest) -> Result<()> {
        let mut inner = self.lock();
        if inner
            .contests
            .iter()
            .any(|c| c.competition_id == contest.competition_id)
        {
            return Err(StorageError::ConstraintViolation(format!(
                "Competition with id {} already exists",
                contest.competition_id
            )));
        }

        let mut stored = contest.clone();
        stored.events.clear();
        inner.contests.push(stored);
        Ok(())
    }

    async fn save_contest(&self, current_id: &str, contest: &Contest) -> Result<()> {
        let mut inner = self.lock();
        if inner.faults.fail_contest_saves {
            return Err(injected_failure("save_contest"));
        }

        let renamed = current_id != contest.competition_id;
        if renamed
            && inner
                .contests
                .iter()
                .any(|c| c.competition_id == contest.competition_id)
        {
            return Err(StorageError::ConstraintViolation(format!(
                "Competition with id {} already exists",
                contest.competition_id
            )));
        }

        let index = inner
            .contests
            .iter()
            .position(|c| c.competition_id == current_id)
            .ok_or(StorageError::NotFound)?;

        let mut stored = contest.clone();
        stored.events.clear();
        inner.contests[index] = stored;

        if renamed {
            for round in inner.rounds.iter_mut().filter(|r| r.competition_id == current_id) {
                round.competition_id = contest.competition_id.clone();
            }
            for result in inner.results.iter_mut().filter(|r| r.competition_id == current_id) {
                result.competition_id = contest.competition_id.clone();
            }
            debug!("Renamed competition {} to {}", current_id, contest.competition_id);
        }

        Ok(())
    }

    async fn delete_contest(&self, competition_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let before = inner.contests.len();
        inner.contests.retain(|c| c.competition_id != competition_id);
        if inner.contests.len() == before {
            return Err(StorageError::NotFound);
        }

        inner.results.retain(|r| r.competition_id != competition_id);
        inner.rounds.retain(|r| r.competition_id != competition_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RoundStore for MemoryStore {
    async fn create_round(&self, round: &Round) -> Result<()> {
        let mut inner = self.lock();
        if inner.rounds.iter().any(|r| r.round_id == round.round_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "Round {} already exists",
                round.round_id
            )));
        }

        let mut stored = round.clone();
        stored.results.clear();
        inner.rounds.push(stored);
        Ok(())
    }

    async fn update_round(&self, round: &Round) -> Result<()> {
        let mut inner = self.lock();
        let stored = inner
            .rounds
            .iter_mut()
            .find(|r| r.round_id == round.round_id)
            .ok_or(StorageError::NotFound)?;

        stored.round_type_id = round.round_type_id;
        stored.format = round.format;
        stored.proceed = round.proceed;
        Ok(())
    }

    async fn delete_rounds(&self, round_ids: &[Uuid]) -> Result<()> {
        let mut inner = self.lock();
        if inner.results.iter().any(|r| round_ids.contains(&r.round_id)) {
            return Err(StorageError::ConstraintViolation(
                "Rounds with results cannot be deleted".to_string(),
            ));
        }

        inner.rounds.retain(|r| !round_ids.contains(&r.round_id));
        Ok(())
    }

    async fn publish_rounds(&self, competition_id: &str) -> Result<u64> {
        let mut inner = self.lock();
        let mut updated = 0;
        for round in inner
            .rounds
            .iter_mut()
            .filter(|r| r.competition_id == competition_id && r.unpublished)
        {
            round.unpublished = false;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryStore {
    async fn find_results(&self, competition_id: &str) -> Result<Vec<ContestResult>> {
        Ok(self
            .lock()
            .results
            .iter()
            .filter(|r| r.competition_id == competition_id)
            .cloned()
            .collect())
    }

    async fn insert_results(&self, results: &[ContestResult]) -> Result<()> {
        let mut inner = self.lock();
        inner.result_insert_calls += 1;

        if inner.faults.fail_all_result_inserts {
            return Err(injected_failure("insert_results"));
        }
        if inner.faults.result_insert_failure_at == Some(inner.result_insert_calls) {
            inner.faults.result_insert_failure_at = None;
            return Err(injected_failure("insert_results"));
        }

        inner.results.extend_from_slice(results);
        Ok(())
    }

    async fn delete_results(&self, competition_id: &str) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.results.len();
        inner.results.retain(|r| r.competition_id != competition_id);
        Ok((before - inner.results.len()) as u64)
    }

    async fn publish_results(&self, competition_id: &str) -> Result<u64> {
        let mut inner = self.lock();
        let mut updated = 0;
        for result in inner
            .results
            .iter_mut()
            .filter(|r| r.competition_id == competition_id && r.unpublished)
        {
            result.unpublished = false;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl EventCatalog for MemoryStore {
    async fn get_event_by_id(&self, event_id: &str) -> Result<EventDefinition> {
        self.lock()
            .events
            .get(event_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait::async_trait]
impl PersonDirectory for MemoryStore {
    async fn get_persons_by_ids(&self, person_ids: &[i32]) -> Result<Vec<Person>> {
        let inner = self.lock();
        Ok(person_ids
            .iter()
            .filter_map(|id| inner.persons.get(id).cloned())
            .collect())
    }
}

#[async_trait::async_trait]
impl RecordTypeCatalog for MemoryStore {
    async fn get_record_types(&self, filter: RecordTypeFilter) -> Result<Vec<RecordType>> {
        Ok(self
            .lock()
            .record_types
            .iter()
            .filter(|rt| filter.active.is_none_or(|active| rt.active == active))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ResultsQuery for MemoryStore {
    async fn best_single_before(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<ContestResult>> {
        let mut holders: Vec<ContestResult> = self
            .lock()
            .results
            .iter()
            .filter(|r| {
                r.event_id == event_id
                    && r.date < cutoff
                    && r.has_valid_best()
                    && r.single_records.iter().any(|label| label == record_label)
            })
            .cloned()
            .collect();

        holders.sort_by_key(|r| (r.best, r.date));
        Ok(holders)
    }

    async fn best_average_before(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<ContestResult>> {
        let mut holders: Vec<ContestResult> = self
            .lock()
            .results
            .iter()
            .filter(|r| {
                r.event_id == event_id
                    && r.date < cutoff
                    && r.has_valid_average()
                    && r.average_records.iter().any(|label| label == record_label)
            })
            .cloned()
            .collect();

        holders.sort_by_key(|r| (r.average, r.date));
        Ok(holders)
    }
}
