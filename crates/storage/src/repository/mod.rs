pub mod catalog;
pub mod contest;
pub mod memory;
pub mod result;
pub mod round;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::Database;
use crate::error::Result;
use crate::models::{Contest, ContestResult, EventDefinition, Person, RecordType, Round};
use crate::traits::{
    ContestFilter, ContestStore, EventCatalog, PersonDirectory, RecordTypeCatalog,
    RecordTypeFilter, ResultStore, ResultsQuery, RoundStore,
};

use catalog::CatalogRepository;
use contest::ContestRepository;
use result::ResultRepository;
use round::RoundRepository;

/// Postgres cannot store `NaiveDate::MAX`; an unbounded cutoff becomes no cutoff
fn bounded(cutoff: NaiveDate) -> Option<NaiveDate> {
    (cutoff != NaiveDate::MAX).then_some(cutoff)
}

#[async_trait::async_trait]
impl ContestStore for Database {
    async fn find_contest(&self, competition_id: &str) -> Result<Option<Contest>> {
        let Some(mut contest) = ContestRepository::new(self.pool())
            .find_by_id(competition_id)
            .await?
        else {
            return Ok(None);
        };

        let results = ResultRepository::new(self.pool())
            .find_by_competition(competition_id)
            .await?;
        contest.events = RoundRepository::new(self.pool())
            .find_events(competition_id, results)
            .await?;

        Ok(Some(contest))
    }

    async fn list_contests(&self, filter: &ContestFilter) -> Result<Vec<Contest>> {
        ContestRepository::new(self.pool()).list(filter).await
    }

    async fn contest_exists(&self, competition_id: &str) -> Result<bool> {
        ContestRepository::new(self.pool()).exists(competition_id).await
    }

    async fn insert_contest(&self, contest: &Contest) -> Result<()> {
        ContestRepository::new(self.pool()).create(contest).await
    }

    async fn save_contest(&self, current_id: &str, contest: &Contest) -> Result<()> {
        ContestRepository::new(self.pool())
            .update(current_id, contest)
            .await
    }

    async fn delete_contest(&self, competition_id: &str) -> Result<()> {
        ContestRepository::new(self.pool()).delete(competition_id).await
    }
}

#[async_trait::async_trait]
impl RoundStore for Database {
    async fn create_round(&self, round: &Round) -> Result<()> {
        RoundRepository::new(self.pool()).create(round).await
    }

    async fn update_round(&self, round: &Round) -> Result<()> {
        RoundRepository::new(self.pool()).update(round).await
    }

    async fn delete_rounds(&self, round_ids: &[Uuid]) -> Result<()> {
        RoundRepository::new(self.pool()).delete_many(round_ids).await
    }

    async fn publish_rounds(&self, competition_id: &str) -> Result<u64> {
        RoundRepository::new(self.pool()).publish(competition_id).await
    }
}

#[async_trait::async_trait]
impl ResultStore for Database {
    async fn find_results(&self, competition_id: &str) -> Result<Vec<ContestResult>> {
        ResultRepository::new(self.pool())
            .find_by_competition(competition_id)
            .await
    }

    async fn insert_results(&self, results: &[ContestResult]) -> Result<()> {
        ResultRepository::new(self.pool()).insert_many(results).await
    }

    async fn delete_results(&self, competition_id: &str) -> Result<u64> {
        ResultRepository::new(self.pool())
            .delete_by_competition(competition_id)
            .await
    }

    async fn publish_results(&self, competition_id: &str) -> Result<u64> {
        ResultRepository::new(self.pool()).publish(competition_id).await
    }
}

#[async_trait::async_trait]
impl EventCatalog for Database {
    async fn get_event_by_id(&self, event_id: &str) -> Result<EventDefinition> {
        CatalogRepository::new(self.pool()).find_event(event_id).await
    }
}

#[async_trait::async_trait]
impl PersonDirectory for Database {
    async fn get_persons_by_ids(&self, person_ids: &[i32]) -> Result<Vec<Person>> {
        CatalogRepository::new(self.pool())
            .find_persons(person_ids)
            .await
    }
}

#[async_trait::async_trait]
impl RecordTypeCatalog for Database {
    async fn get_record_types(&self, filter: RecordTypeFilter) -> Result<Vec<RecordType>> {
        CatalogRepository::new(self.pool())
            .list_record_types(filter)
            .await
    }
}

#[async_trait::async_trait]
impl ResultsQuery for Database {
    async fn best_single_before(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<ContestResult>> {
        ResultRepository::new(self.pool())
            .single_record_holders(event_id, record_label, bounded(cutoff))
            .await
    }

    async fn best_average_before(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: NaiveDate,
    ) -> Result<Vec<ContestResult>> {
        ResultRepository::new(self.pool())
            .average_record_holders(event_id, record_label, bounded(cutoff))
            .await
    }
}
