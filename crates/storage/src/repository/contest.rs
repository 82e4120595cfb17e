use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::models::{Contest, ContestEvent, Person};
use crate::traits::ContestFilter;

#[derive(Debug, FromRow)]
struct ContestRow {
    competition_id: String,
    name: String,
    contest_type: String,
    state: String,
    city: String,
    venue: String,
    address: Option<String>,
    country_id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    created_by: i32,
    contact: Option<String>,
    description: Option<String>,
    competitor_limit: Option<i32>,
    main_event_id: String,
    participants: i32,
}

impl ContestRow {
    fn into_contest(self, organizers: Vec<Person>, events: Vec<ContestEvent>) -> Result<Contest> {
        Ok(Contest {
            competition_id: self.competition_id,
            name: self.name,
            contest_type: self.contest_type.parse()?,
            state: self.state.parse()?,
            city: self.city,
            venue: self.venue,
            address: self.address,
            country_id: self.country_id,
            latitude: self.latitude,
            longitude: self.longitude,
            start_date: self.start_date,
            end_date: self.end_date,
            organizers,
            created_by: self.created_by,
            contact: self.contact,
            description: self.description,
            competitor_limit: self.competitor_limit,
            main_event_id: self.main_event_id,
            participants: self.participants,
            events,
        })
    }
}

const CONTEST_COLUMNS: &str = r#"
    competition_id, name, contest_type, state, city, venue, address, country_id,
    latitude, longitude, start_date, end_date, created_by, contact, description,
    competitor_limit, main_event_id, participants
"#;

/// Repository for Contest database operations
pub struct ContestRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ContestRepository<'a> {
    /// Create a new ContestRepository
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a contest by ID, without its events
    pub async fn find_by_id(&self, competition_id: &str) -> Result<Option<Contest>> {
        let row = sqlx::query_as::<_, ContestRow>(&format!(
            "SELECT {} FROM contests WHERE competition_id = $1",
            CONTEST_COLUMNS
        ))
        .bind(competition_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => {
                let organizers = self.organizers(competition_id).await?;
                Ok(Some(row.into_contest(organizers, Vec::new())?))
            }
            None => Ok(None),
        }
    }

    /// List contests matching the filter, newest first
    pub async fn list(&self, filter: &ContestFilter) -> Result<Vec<Contest>> {
        let rows = sqlx::query_as::<_, ContestRow>(&format!(
            r#"
            SELECT {}
            FROM contests
            WHERE ($1::text IS NULL OR country_id = $1)
              AND ($2::int IS NULL OR created_by = $2)
              AND (NOT $3 OR state IN ('approved', 'ongoing', 'finished', 'published'))
            ORDER BY start_date DESC, created_at DESC
            "#,
            CONTEST_COLUMNS
        ))
        .bind(filter.country_id.as_deref())
        .bind(filter.created_by)
        .bind(filter.visible_only)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_contest(Vec::new(), Vec::new()))
            .collect()
    }

    pub async fn exists(&self, competition_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM contests WHERE competition_id = $1)",
        )
        .bind(competition_id)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Create a new contest
    pub async fn create(&self, contest: &Contest) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO contests (
                competition_id, name, contest_type, state, city, venue, address, country_id,
                latitude, longitude, start_date, end_date, created_by, contact, description,
                competitor_limit, main_event_id, participants
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&contest.competition_id)
        .bind(&contest.name)
        .bind(contest.contest_type.as_str())
        .bind(contest.state.as_str())
        .bind(&contest.city)
        .bind(&contest.venue)
        .bind(contest.address.as_deref())
        .bind(&contest.country_id)
        .bind(contest.latitude)
        .bind(contest.longitude)
        .bind(contest.start_date)
        .bind(contest.end_date)
        .bind(contest.created_by)
        .bind(contest.contact.as_deref())
        .bind(contest.description.as_deref())
        .bind(contest.competitor_limit)
        .bind(&contest.main_event_id)
        .bind(contest.participants)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // Handle unique constraint violations for the competition ID
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.code().as_deref() == Some("23505") {
                    return StorageError::ConstraintViolation(format!(
                        "Competition with id {} already exists",
                        contest.competition_id
                    ));
                }
            }
            StorageError::from(e)
        })?;

        Self::replace_organizers(&mut tx, &contest.competition_id, &contest.organizers).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Update an existing contest, renaming it when the competition ID changed
    pub async fn update(&self, current_id: &str, contest: &Contest) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE contests
            SET
                competition_id = $2,
                name = $3,
                contest_type = $4,
                state = $5,
                city = $6,
                venue = $7,
                address = $8,
                country_id = $9,
                latitude = $10,
                longitude = $11,
                start_date = $12,
                end_date = $13,
                contact = $14,
                description = $15,
                competitor_limit = $16,
                main_event_id = $17,
                participants = $18
            WHERE competition_id = $1
            "#,
        )
        .bind(current_id)
        .bind(&contest.competition_id)
        .bind(&contest.name)
        .bind(contest.contest_type.as_str())
        .bind(contest.state.as_str())
        .bind(&contest.city)
        .bind(&contest.venue)
        .bind(contest.address.as_deref())
        .bind(&contest.country_id)
        .bind(contest.latitude)
        .bind(contest.longitude)
        .bind(contest.start_date)
        .bind(contest.end_date)
        .bind(contest.contact.as_deref())
        .bind(contest.description.as_deref())
        .bind(contest.competitor_limit)
        .bind(&contest.main_event_id)
        .bind(contest.participants)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let error = StorageError::from(e);
            if error.is_unique_violation() {
                StorageError::ConstraintViolation(format!(
                    "Competition with id {} already exists",
                    contest.competition_id
                ))
            } else {
                error
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Self::replace_organizers(&mut tx, &contest.competition_id, &contest.organizers).await?;

        tx.commit().await?;

        if current_id != contest.competition_id {
            debug!(
                "Renamed competition {} to {}, rounds and results follow",
                current_id, contest.competition_id
            );
        }
        Ok(())
    }

    /// Delete a contest by ID, together with its rounds and results
    pub async fn delete(&self, competition_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM results WHERE competition_id = $1")
            .bind(competition_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM rounds WHERE competition_id = $1")
            .bind(competition_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM contests WHERE competition_id = $1")
            .bind(competition_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn organizers(&self, competition_id: &str) -> Result<Vec<Person>> {
        let rows: Vec<(i32, String, String)> = sqlx::query_as(
            r#"
            SELECT p.person_id, p.name, p.country_iso2
            FROM contest_organizers o
            INNER JOIN persons p ON p.person_id = o.person_id
            WHERE o.competition_id = $1
            ORDER BY o.position
            "#,
        )
        .bind(competition_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(person_id, name, country_iso2)| Person {
                person_id,
                name,
                country_iso2,
            })
            .collect())
    }

    async fn replace_organizers(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        competition_id: &str,
        organizers: &[Person],
    ) -> Result<()> {
        sqlx::query("DELETE FROM contest_organizers WHERE competition_id = $1")
            .bind(competition_id)
            .execute(&mut **tx)
            .await?;

        for (position, organizer) in organizers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO contest_organizers (competition_id, person_id, position)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(competition_id)
            .bind(organizer.person_id)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}
