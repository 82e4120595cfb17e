use sqlx::{FromRow, PgPool};

use crate::error::{Result, StorageError};
use crate::models::{EventDefinition, Person, RecordType};
use crate::traits::RecordTypeFilter;

#[derive(Debug, FromRow)]
struct EventRow {
    event_id: String,
    name: String,
    rank: i32,
}

#[derive(Debug, FromRow)]
struct PersonRow {
    person_id: i32,
    name: String,
    country_iso2: String,
}

#[derive(Debug, FromRow)]
struct RecordTypeRow {
    label: String,
    category: String,
    active: bool,
}

/// Read access to the event, person and record type catalogs
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_event(&self, event_id: &str) -> Result<EventDefinition> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, name, rank FROM events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        Ok(EventDefinition {
            event_id: row.event_id,
            name: row.name,
            rank: row.rank,
        })
    }

    /// Persons with the given IDs, in the order the IDs were given
    pub async fn find_persons(&self, person_ids: &[i32]) -> Result<Vec<Person>> {
        let rows = sqlx::query_as::<_, PersonRow>(
            r#"
            SELECT p.person_id, p.name, p.country_iso2
            FROM persons p
            INNER JOIN UNNEST($1::int[]) WITH ORDINALITY AS ids(person_id, position)
                ON ids.person_id = p.person_id
            ORDER BY ids.position
            "#,
        )
        .bind(person_ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Person {
                person_id: row.person_id,
                name: row.name,
                country_iso2: row.country_iso2,
            })
            .collect())
    }

    pub async fn list_record_types(&self, filter: RecordTypeFilter) -> Result<Vec<RecordType>> {
        let rows = sqlx::query_as::<_, RecordTypeRow>(
            r#"
            SELECT label, category, active
            FROM record_types
            WHERE ($1::bool IS NULL OR active = $1)
            ORDER BY category, label
            "#,
        )
        .bind(filter.active)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RecordType {
                    label: row.label,
                    category: row.category.parse()?,
                    active: row.active,
                })
            })
            .collect()
    }
}
