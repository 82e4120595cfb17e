use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Attempt, ContestResult, ParticipantIds};

#[derive(Debug, FromRow)]
struct ResultRow {
    result_id: Uuid,
    competition_id: String,
    event_id: String,
    round_id: Uuid,
    date: NaiveDate,
    person_ids: Vec<i32>,
    ranking: i32,
    attempts: Vec<i64>,
    best: i64,
    average: i64,
    single_records: Vec<String>,
    average_records: Vec<String>,
    unpublished: bool,
}

impl From<ResultRow> for ContestResult {
    fn from(row: ResultRow) -> Self {
        Self {
            result_id: row.result_id,
            competition_id: row.competition_id,
            event_id: row.event_id,
            round_id: row.round_id,
            date: row.date,
            person_ids: ParticipantIds::new(row.person_ids),
            ranking: row.ranking,
            attempts: row
                .attempts
                .into_iter()
                .map(|result| Attempt { result })
                .collect(),
            best: row.best,
            average: row.average,
            single_records: row.single_records,
            average_records: row.average_records,
            unpublished: row.unpublished,
        }
    }
}

const RESULT_COLUMNS: &str = r#"
    result_id, competition_id, event_id, round_id, date, person_ids, ranking,
    attempts, best, average, single_records, average_records, unpublished
"#;

/// How many record holders the record queries return
const RECORD_QUERY_LIMIT: i64 = 10;

/// Repository for Result database operations
pub struct ResultRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ResultRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_competition(&self, competition_id: &str) -> Result<Vec<ContestResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {} FROM results WHERE competition_id = $1 ORDER BY round_id, ranking",
            RESULT_COLUMNS
        ))
        .bind(competition_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(ContestResult::from).collect())
    }

    /// Inserts all results in one transaction
    pub async fn insert_many(&self, results: &[ContestResult]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for result in results {
            let attempts: Vec<i64> = result.attempts.iter().map(|a| a.result).collect();

            sqlx::query(&format!(
                r#"
                INSERT INTO results ({})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
                RESULT_COLUMNS
            ))
            .bind(result.result_id)
            .bind(&result.competition_id)
            .bind(&result.event_id)
            .bind(result.round_id)
            .bind(result.date)
            .bind(result.person_ids.as_slice())
            .bind(result.ranking)
            .bind(&attempts)
            .bind(result.best)
            .bind(result.average)
            .bind(&result.single_records)
            .bind(&result.average_records)
            .bind(result.unpublished)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_by_competition(&self, competition_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM results WHERE competition_id = $1")
            .bind(competition_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn publish(&self, competition_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE results SET unpublished = FALSE WHERE competition_id = $1 AND unpublished",
        )
        .bind(competition_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Results holding the given single record before the cutoff, best first.
    /// `None` means no cutoff.
    pub async fn single_record_holders(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<Vec<ContestResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            r#"
            SELECT {}
            FROM results
            WHERE event_id = $1
              AND $2 = ANY(single_records)
              AND ($3::date IS NULL OR date < $3)
              AND best > 0
            ORDER BY best ASC, date ASC
            LIMIT $4
            "#,
            RESULT_COLUMNS
        ))
        .bind(event_id)
        .bind(record_label)
        .bind(cutoff)
        .bind(RECORD_QUERY_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(ContestResult::from).collect())
    }

    /// Results holding the given average record before the cutoff, best first
    pub async fn average_record_holders(
        &self,
        event_id: &str,
        record_label: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<Vec<ContestResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            r#"
            SELECT {}
            FROM results
            WHERE event_id = $1
              AND $2 = ANY(average_records)
              AND ($3::date IS NULL OR date < $3)
              AND average > 0
            ORDER BY average ASC, date ASC
            LIMIT $4
            "#,
            RESULT_COLUMNS
        ))
        .bind(event_id)
        .bind(record_label)
        .bind(cutoff)
        .bind(RECORD_QUERY_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(ContestResult::from).collect())
    }
}
