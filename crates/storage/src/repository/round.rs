use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{ContestEvent, ContestResult, EventDefinition, ProceedRule, Round};

#[derive(Debug, FromRow)]
struct RoundRow {
    round_id: Uuid,
    competition_id: String,
    event_id: String,
    date: NaiveDate,
    round_type_id: String,
    format: String,
    proceed_type: Option<String>,
    proceed_value: Option<i32>,
    unpublished: bool,
    event_name: String,
    event_rank: i32,
}

impl RoundRow {
    fn event(&self) -> EventDefinition {
        EventDefinition {
            event_id: self.event_id.clone(),
            name: self.event_name.clone(),
            rank: self.event_rank,
        }
    }

    fn into_round(self) -> Result<Round> {
        let proceed = match (self.proceed_type, self.proceed_value) {
            (Some(kind), Some(value)) => Some(ProceedRule {
                kind: kind.parse()?,
                value,
            }),
            (None, None) => None,
            _ => {
                return Err(StorageError::InvalidData(format!(
                    "Round {} has an incomplete proceed rule",
                    self.round_id
                )));
            }
        };

        Ok(Round {
            round_id: self.round_id,
            competition_id: self.competition_id,
            event_id: self.event_id,
            date: self.date,
            round_type_id: self.round_type_id.parse()?,
            format: self.format.parse()?,
            proceed,
            results: Vec::new(),
            unpublished: self.unpublished,
        })
    }
}

/// Repository for Round database operations
pub struct RoundRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RoundRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Loads the contest's events with their rounds, attaching the given
    /// results to their rounds. Events come ordered by rank, rounds by date.
    pub async fn find_events(
        &self,
        competition_id: &str,
        results: Vec<ContestResult>,
    ) -> Result<Vec<ContestEvent>> {
        let rows = sqlx::query_as::<_, RoundRow>(
            r#"
            SELECT r.round_id, r.competition_id, r.event_id, r.date, r.round_type_id, r.format,
                   r.proceed_type, r.proceed_value, r.unpublished,
                   e.name AS event_name, e.rank AS event_rank
            FROM rounds r
            INNER JOIN events e ON e.event_id = r.event_id
            WHERE r.competition_id = $1
            ORDER BY e.rank, r.date, r.round_seq
            "#,
        )
        .bind(competition_id)
        .fetch_all(self.pool)
        .await?;

        let mut events: Vec<ContestEvent> = Vec::new();

        for row in rows {
            let event = row.event();
            let round = row.into_round()?;

            match events.last_mut() {
                Some(last) if last.event.event_id == event.event_id => last.rounds.push(round),
                _ => events.push(ContestEvent {
                    event,
                    rounds: vec![round],
                }),
            }
        }

        for result in results {
            if let Some(round) = events
                .iter_mut()
                .flat_map(|e| e.rounds.iter_mut())
                .find(|r| r.round_id == result.round_id)
            {
                round.results.push(result);
            }
        }

        Ok(events)
    }

    pub async fn create(&self, round: &Round) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rounds (
                round_id, competition_id, event_id, date, round_type_id, format,
                proceed_type, proceed_value, unpublished
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(round.round_id)
        .bind(&round.competition_id)
        .bind(&round.event_id)
        .bind(round.date)
        .bind(round.round_type_id.code())
        .bind(round.format.code())
        .bind(round.proceed.map(|p| p.kind.as_str()))
        .bind(round.proceed.map(|p| p.value))
        .bind(round.unpublished)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn update(&self, round: &Round) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE rounds
            SET round_type_id = $2, format = $3, proceed_type = $4, proceed_value = $5
            WHERE round_id = $1
            "#,
        )
        .bind(round.round_id)
        .bind(round.round_type_id.code())
        .bind(round.format.code())
        .bind(round.proceed.map(|p| p.kind.as_str()))
        .bind(round.proceed.map(|p| p.value))
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    pub async fn delete_many(&self, round_ids: &[Uuid]) -> Result<()> {
        sqlx::query("DELETE FROM rounds WHERE round_id = ANY($1)")
            .bind(round_ids)
            .execute(self.pool)
            .await
            .map_err(|e| {
                let error = StorageError::from(e);
                if error.is_foreign_key_violation() {
                    StorageError::ConstraintViolation(
                        "Rounds with results cannot be deleted".to_string(),
                    )
                } else {
                    error
                }
            })?;

        Ok(())
    }

    pub async fn publish(&self, competition_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE rounds SET unpublished = FALSE WHERE competition_id = $1 AND unpublished",
        )
        .bind(competition_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
