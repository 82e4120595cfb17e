use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveTime, Utc};
use storage::dto::contest::{
    ContestData, ContestListItem, ContestModData, ContestRequest, EventRequest,
    PostResultsResponse,
};
use storage::error::StorageError;
use storage::models::{
    Contest, ContestEvent, ContestState, ContestType, Person, RecordSnapshot, RecordType,
};
use storage::traits::{ContestFilter, RecordTypeFilter, Store};
use tracing::{info, warn};
use validator::Validate;

use crate::config::ContestSettings;
use crate::error::{ContestError, Result};
use crate::hooks::TransitionHooks;
use crate::participants::contest_participants;
use crate::posting;
use crate::reconcile::{create_event, reconcile_events, resolve_events};
use crate::records::compute_records;
use crate::state::{
    ContestField, Role, TransitionOutcome, UpdateReport, authorize_transition, is_privileged,
};

/// Entry point of the contest core. Every operation loads what it needs from
/// the store, checks the lifecycle rules and delegates to the engines.
pub struct ContestService<S: Store> {
    store: Arc<S>,
    settings: ContestSettings,
    hooks: TransitionHooks<S>,
    /// One lock per contest id, held for the whole of a results post
    posting_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: Store> ContestService<S> {
    pub fn new(store: Arc<S>, settings: ContestSettings) -> Self {
        Self::with_hooks(store, settings, TransitionHooks::default())
    }

    pub fn with_hooks(store: Arc<S>, settings: ContestSettings, hooks: TransitionHooks<S>) -> Self {
        Self {
            store,
            settings,
            hooks,
            posting_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn find_contest(&self, competition_id: &str) -> Result<Contest> {
        self.store
            .find_contest(competition_id)
            .await?
            .ok_or_else(|| ContestError::contest_not_found(competition_id))
    }

    /// Contests past `Created`, newest first
    pub async fn list_contests(&self, region: Option<&str>) -> Result<Vec<ContestListItem>> {
        let filter = ContestFilter {
            country_id: region.map(str::to_string),
            created_by: None,
            visible_only: true,
        };
        let contests = self.store.list_contests(&filter).await?;

        Ok(contests.iter().map(ContestListItem::from).collect())
    }

    /// Every contest for the privileged role, otherwise the user's own
    pub async fn list_mod_contests(
        &self,
        user_id: i32,
        roles: &[Role],
    ) -> Result<Vec<ContestListItem>> {
        let filter = ContestFilter {
            created_by: (!is_privileged(roles)).then_some(user_id),
            ..Default::default()
        };
        let contests = self.store.list_contests(&filter).await?;

        Ok(contests.iter().map(ContestListItem::from).collect())
    }

    async fn participating_persons(&self, events: &[ContestEvent]) -> Result<Vec<Person>> {
        let mut person_ids: Vec<i32> = contest_participants(events).into_iter().collect();
        if person_ids.is_empty() {
            return Ok(Vec::new());
        }
        person_ids.sort_unstable();

        Ok(self.store.get_persons_by_ids(&person_ids).await?)
    }

    /// Public view. Contests that were not approved yet do not exist for the
    /// public.
    pub async fn get_contest(&self, competition_id: &str) -> Result<ContestData> {
        let contest = self.find_contest(competition_id).await?;
        if !contest.state.is_at_least(ContestState::Approved) {
            return Err(ContestError::contest_not_found(competition_id));
        }

        let persons = if contest.state.is_at_least(ContestState::Ongoing) {
            self.participating_persons(&contest.events).await?
        } else {
            Vec::new()
        };

        Ok(ContestData { contest, persons })
    }

    /// Moderator view, with the records of every event as they stood when the
    /// contest started
    pub async fn get_mod_contest(&self, competition_id: &str) -> Result<ContestModData> {
        let contest = self.find_contest(competition_id).await?;
        let persons = self.participating_persons(&contest.events).await?;
        let record_types = self.active_record_types().await?;
        let start = contest.start_date.and_time(NaiveTime::MIN).and_utc();

        let mut records = BTreeMap::new();
        for event in &contest.events {
            let snapshot =
                compute_records(self.store.as_ref(), event.event_id(), &record_types, Some(start))
                    .await?;
            records.insert(event.event_id().to_string(), snapshot);
        }

        Ok(ContestModData {
            contest,
            persons,
            records,
        })
    }

    pub async fn active_record_types(&self) -> Result<Vec<RecordType>> {
        Ok(self
            .store
            .get_record_types(RecordTypeFilter { active: Some(true) })
            .await?)
    }

    /// Records of an event before the given instant (truncated to its UTC
    /// date), or the current records without one
    pub async fn get_records_for_event(
        &self,
        event_id: &str,
        record_types: &[RecordType],
        before: Option<DateTime<Utc>>,
    ) -> Result<Option<RecordSnapshot>> {
        compute_records(self.store.as_ref(), event_id, record_types, before).await
    }

    /// Checks that need more than one field, or the contest's settings.
    /// Runs before anything is written.
    fn validate_structure(
        &self,
        request: &ContestRequest,
        contest_type: ContestType,
    ) -> Result<()> {
        let rejected = |msg: String| Err(ContestError::Rejected(msg));

        for (i, event) in request.events.iter().enumerate() {
            if request.events[..i]
                .iter()
                .any(|e| e.event_id == event.event_id)
            {
                return rejected(format!("Event {} appears more than once", event.event_id));
            }
            if event.rounds.is_empty() {
                return rejected("You cannot have an event with no rounds".to_string());
            }
            if event.rounds.len() > self.settings.max_rounds {
                return rejected(format!(
                    "You cannot have an event with more than {} rounds",
                    self.settings.max_rounds
                ));
            }

            let last = event.rounds.len() - 1;
            for (position, round) in event.rounds.iter().enumerate() {
                match (position == last, round.proceed.is_some()) {
                    (true, true) => {
                        return rejected(format!(
                            "The final round of event {} cannot have a proceed rule",
                            event.event_id
                        ));
                    }
                    (false, false) => {
                        return rejected(format!(
                            "Every round of event {} except the final one needs a proceed rule",
                            event.event_id
                        ));
                    }
                    _ => {}
                }
            }
        }

        if contest_type.is_multi_day() && request.end_date.is_none() {
            return rejected("Please enter an end date".to_string());
        }

        request
            .validate_dates()
            .map_err(|msg| ContestError::Rejected(msg.to_string()))
    }

    /// Creates an empty contest in the `Created` state, with all of its rounds
    /// stored without results
    pub async fn create_contest(&self, request: &ContestRequest, creator: i32) -> Result<Contest> {
        request.validate()?;
        self.validate_structure(request, request.contest_type)?;

        if self.store.contest_exists(&request.competition_id).await? {
            return Err(ContestError::Rejected(format!(
                "Competition with id {} already exists",
                request.competition_id
            )));
        }

        let events = resolve_events(self.store.as_ref(), request.events.iter().collect()).await?;

        let organizers = if request.organizers.is_empty() {
            Vec::new()
        } else {
            self.store.get_persons_by_ids(&request.organizers).await?
        };

        let mut contest = Contest {
            competition_id: request.competition_id.clone(),
            name: request.name.clone(),
            contest_type: request.contest_type,
            state: ContestState::Created,
            city: request.city.clone(),
            venue: request.venue.clone(),
            address: request.address.clone(),
            country_id: request.country_id.clone(),
            latitude: request.latitude,
            longitude: request.longitude,
            start_date: request.start_date,
            end_date: request.end_date,
            organizers,
            created_by: creator,
            contact: request.contact.clone(),
            description: request.description.clone(),
            competitor_limit: request.competitor_limit,
            main_event_id: request.main_event_id.clone(),
            participants: 0,
            events: Vec::new(),
        };

        self.store.insert_contest(&contest).await?;

        for (definition, event) in events {
            let event =
                create_event(self.store.as_ref(), &contest.competition_id, definition, event)
                    .await?;
            contest.events.push(event);
        }
        contest.events.sort_by_key(|e| e.event.rank);

        info!(
            "Created competition {} with {} events",
            contest.competition_id,
            contest.events.len()
        );

        Ok(contest)
    }

    /// Applies an edit. Fields the contest's state (or the caller's role)
    /// does not allow to change keep their stored value; the report lists
    /// them as skipped.
    pub async fn update_contest(
        &self,
        competition_id: &str,
        request: &ContestRequest,
        roles: &[Role],
    ) -> Result<UpdateReport> {
        let contest = self.find_contest(competition_id).await?;

        request.validate()?;
        self.validate_structure(request, contest.contest_type)?;

        let privileged = is_privileged(roles);
        let state = contest.state;
        let editable = |field: ContestField| field.is_editable(state, privileged);

        let mut report = UpdateReport::default();
        let mut updated = contest.clone();

        report.apply(
            ContestField::CompetitionId,
            editable,
            &mut updated.competition_id,
            &request.competition_id,
        );
        report.apply(
            ContestField::CountryId,
            editable,
            &mut updated.country_id,
            &request.country_id,
        );

        if request.contact.is_some() {
            report.apply(ContestField::Contact, editable, &mut updated.contact, &request.contact);
        }
        if request.description.is_some() {
            report.apply(
                ContestField::Description,
                editable,
                &mut updated.description,
                &request.description,
            );
        }

        report.apply(ContestField::Name, editable, &mut updated.name, &request.name);
        report.apply(ContestField::City, editable, &mut updated.city, &request.city);
        report.apply(ContestField::Venue, editable, &mut updated.venue, &request.venue);
        if request.address.is_some() {
            report.apply(ContestField::Address, editable, &mut updated.address, &request.address);
        }
        if request.latitude.is_some() && request.longitude.is_some() {
            let mut coordinates = (updated.latitude, updated.longitude);
            report.apply(
                ContestField::Coordinates,
                editable,
                &mut coordinates,
                &(request.latitude, request.longitude),
            );
            (updated.latitude, updated.longitude) = coordinates;
        }
        report.apply(
            ContestField::StartDate,
            editable,
            &mut updated.start_date,
            &request.start_date,
        );
        if request.end_date.is_some() {
            report.apply(ContestField::EndDate, editable, &mut updated.end_date, &request.end_date);
        }
        if request.competitor_limit.is_some() {
            report.apply(
                ContestField::CompetitorLimit,
                editable,
                &mut updated.competitor_limit,
                &request.competitor_limit,
            );
        }
        report.apply(
            ContestField::MainEventId,
            editable,
            &mut updated.main_event_id,
            &request.main_event_id,
        );

        let organizer_ids: Vec<i32> = contest.organizers.iter().map(|p| p.person_id).collect();
        if organizer_ids != request.organizers {
            let allowed = editable(ContestField::Organizers);
            report.record(ContestField::Organizers, allowed);
            if allowed {
                updated.organizers = self.store.get_persons_by_ids(&request.organizers).await?;
            }
        }

        if !same_structure(&contest.events, &request.events) {
            report.record(ContestField::Events, editable(ContestField::Events));
        }
        if editable(ContestField::Events) {
            let (events, events_report) = reconcile_events(
                self.store.as_ref(),
                &contest.competition_id,
                contest.events,
                &request.events,
            )
            .await?;
            updated.events = events;
            report.events = Some(events_report);
        } else {
            updated.events = contest.events;
        }

        self.store.save_contest(competition_id, &updated).await?;

        if !report.skipped.is_empty() {
            warn!(
                "Update of {} in state {} skipped fields {:?}",
                competition_id, state, report.skipped
            );
        }
        info!(
            "Updated competition {} ({} fields changed)",
            updated.competition_id,
            report.applied.len()
        );

        Ok(report)
    }

    /// Moves a contest to `target` if the caller is allowed to. Unauthorized
    /// transitions leave the contest untouched and are reported as ignored.
    pub async fn advance_state(
        &self,
        competition_id: &str,
        target: ContestState,
        roles: &[Role],
    ) -> Result<TransitionOutcome> {
        let mut contest = self.find_contest(competition_id).await?;
        let outcome = authorize_transition(contest.state, target, roles);

        match outcome {
            TransitionOutcome::Applied { from, to } => {
                self.hooks.run(to, self.store.as_ref(), &contest).await?;

                contest.state = to;
                self.store.save_contest(competition_id, &contest).await?;
                info!("Competition {} moved from {} to {}", competition_id, from, to);
            }
            TransitionOutcome::Ignored { current } => {
                info!(
                    "Ignoring transition of {} from {} to {} for roles {:?}",
                    competition_id, current, target, roles
                );
            }
        }

        Ok(outcome)
    }

    fn posting_locks(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.posting_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn posting_lock(&self, competition_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.posting_locks()
            .entry(competition_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops the lock of a contest once no post holds or waits for it
    fn release_posting_lock(&self, competition_id: &str) {
        let mut locks = self.posting_locks();
        if locks
            .get(competition_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(competition_id);
        }
    }

    /// Replaces all results of a contest. Only allowed from `Approved` up to,
    /// but not including, `Finished`.
    pub async fn post_results(
        &self,
        competition_id: &str,
        events: &[EventRequest],
    ) -> Result<PostResultsResponse> {
        for event in events {
            event.validate()?;
        }

        let lock = self.posting_lock(competition_id);
        let outcome = {
            let _guard = lock.lock().await;
            match self.find_contest(competition_id).await {
                Ok(mut contest) => {
                    posting::post_results(self.store.as_ref(), &mut contest, events).await
                }
                Err(e) => Err(e),
            }
        };
        drop(lock);
        self.release_posting_lock(competition_id);

        outcome
    }

    pub async fn delete_contest(&self, competition_id: &str, roles: &[Role]) -> Result<()> {
        if !is_privileged(roles) {
            return Err(ContestError::Rejected(
                "Only an admin may delete a competition".to_string(),
            ));
        }

        self.store
            .delete_contest(competition_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => ContestError::contest_not_found(competition_id),
                other => other.into(),
            })?;

        info!("Deleted competition {}", competition_id);
        Ok(())
    }
}

/// Whether the request describes the stored event structure as it is
fn same_structure(stored: &[ContestEvent], requested: &[EventRequest]) -> bool {
    stored.len() == requested.len()
        && stored.iter().all(|event| {
            let Some(request) = requested.iter().find(|e| e.event_id == event.event_id()) else {
                return false;
            };
            event.rounds.len() == request.rounds.len()
                && event.rounds.iter().all(|round| {
                    request.rounds.iter().any(|r| {
                        r.round_id == Some(round.round_id)
                            && r.round_type_id == round.round_type_id
                            && r.format == round.format
                            && r.proceed == round.proceed
                    })
                })
        })
}
