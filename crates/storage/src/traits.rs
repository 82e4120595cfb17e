//! Interfaces the contest core consumes from its storage and catalog
//! collaborators.
//!
//! Both `Database` (Postgres) and `MemoryStore` implement all of them; the core
//! is generic over [`Store`].

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Contest, ContestResult, EventDefinition, Person, RecordType, Round};

/// Filter for contest listings
#[derive(Debug, Clone, Default)]
pub struct ContestFilter {
    pub country_id: Option<String>,
    pub created_by: Option<i32>,
    /// Only contests that progressed past `Created`
    pub visible_only: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTypeFilter {
    pub active: Option<bool>,
}

#[async_trait::async_trait]
pub trait ContestStore: Send + Sync {
    /// Loads the contest with its events, rounds and results
    async fn find_contest(&self, competition_id: &str) -> Result<Option<Contest>>;

    /// Lists contests newest first. Events are not populated.
    async fn list_contests(&self, filter: &ContestFilter) -> Result<Vec<Contest>>;

    async fn contest_exists(&self, competition_id: &str) -> Result<bool>;

    /// Writes the contest's own fields and organizers. The event structure is
    /// persisted through [`RoundStore`].
    async fn insert_contest(&self, contest: &Contest) -> Result<()>;

    /// Same as [`ContestStore::insert_contest`] for an existing contest.
    /// `current_id` is the id the contest is stored under, which differs from
    /// `contest.competition_id` when the id gets renamed.
    async fn save_contest(&self, current_id: &str, contest: &Contest) -> Result<()>;

    /// Deletes the contest together with its rounds and results
    async fn delete_contest(&self, competition_id: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait RoundStore: Send + Sync {
    /// Stores a round without its results
    async fn create_round(&self, round: &Round) -> Result<()>;

    /// Updates round type, format and proceed rule
    async fn update_round(&self, round: &Round) -> Result<()>;

    async fn delete_rounds(&self, round_ids: &[Uuid]) -> Result<()>;

    /// Clears the unpublished flag of every round of the contest
    async fn publish_rounds(&self, competition_id: &str) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    async fn find_results(&self, competition_id: &str) -> Result<Vec<ContestResult>>;

    async fn insert_results(&self, results: &[ContestResult]) -> Result<()>;

    async fn delete_results(&self, competition_id: &str) -> Result<u64>;

    /// Clears the unpublished flag of every result of the contest
    async fn publish_results(&self, competition_id: &str) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait EventCatalog: Send + Sync {
    /// Fails with `StorageError::NotFound` for unknown events
    async fn get_event_by_id(&self, event_id: &str) -> Result<EventDefinition>;
}

#[async_trait::async_trait]
pub trait PersonDirectory: Send + Sync {
    async fn get_persons_by_ids(&self, person_ids: &[i32]) -> Result<Vec<Person>>;
}

#[async_trait::async_trait]
pub trait RecordTypeCatalog: Send + Sync {
    async fn get_record_types(&self, filter: RecordTypeFilter) -> Result<Vec<RecordType>>;
}

/// Record holder lookups. Both queries only consider results dated strictly
/// before `cutoff` that carry `record_label`, best first.
#[async_trait::async_trait]
pub trait ResultsQuery: Send + Sync {
    async fn best_single_before(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<ContestResult>>;

    async fn best_average_before(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<ContestResult>>;
}

/// Everything the contest core needs from the outside world
pub trait Store:
    ContestStore
    + RoundStore
    + ResultStore
    + EventCatalog
    + PersonDirectory
    + RecordTypeCatalog
    + ResultsQuery
{
}

impl<T> Store for T where
    T: ContestStore
        + RoundStore
        + ResultStore
        + EventCatalog
        + PersonDirectory
        + RecordTypeCatalog
        + ResultsQuery
{
}
