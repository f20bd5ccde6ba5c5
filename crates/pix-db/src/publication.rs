//! Publication persistence and scheduling.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pix_models::{OrderedItem, Publication, PublicationId, PublicationState};
use sqlx::{FromRow, PgPool};
use tracing::{info, instrument};

use crate::error::{DbError, DbResult};
use crate::gallery::ensure_media_owned;
use crate::media::map_constraint;

const PUBLICATION_COLUMNS: &str =
    "id, owner_id, title, description, scheduled_at, published_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct PublicationRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublicationRow {
    fn into_publication(self, items: Vec<OrderedItem>) -> Publication {
        Publication {
            id: PublicationId::from_string(self.id),
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            scheduled_at: self.scheduled_at,
            published_at: self.published_at,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct PublicationItemRow {
    publication_id: String,
    media_id: String,
    position: i32,
}

/// SQL predicate selecting rows in `state`.
fn state_predicate(state: Option<PublicationState>) -> &'static str {
    match state {
        None => "TRUE",
        Some(PublicationState::Draft) => "published_at IS NULL AND scheduled_at IS NULL",
        Some(PublicationState::Scheduled) => "published_at IS NULL AND scheduled_at IS NOT NULL",
        Some(PublicationState::Published) => "published_at IS NOT NULL",
    }
}

#[derive(Clone)]
pub struct PublicationRepository {
    pool: PgPool,
}

impl PublicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a publication and its ordered items in one transaction.
    #[instrument(skip(self, publication), fields(publication_id = %publication.id))]
    pub async fn create(&self, publication: &Publication) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let media_ids: Vec<_> = publication.items.iter().map(|i| i.media_id.clone()).collect();
        ensure_media_owned(&mut tx, &publication.owner_id, &media_ids).await?;

        sqlx::query(
            r#"
            INSERT INTO publications (
                id, owner_id, title, description, scheduled_at, published_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(publication.id.as_str())
        .bind(&publication.owner_id)
        .bind(&publication.title)
        .bind(&publication.description)
        .bind(publication.scheduled_at)
        .bind(publication.published_at)
        .bind(publication.created_at)
        .bind(publication.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_constraint(e, "publication"))?;

        for item in &publication.items {
            sqlx::query(
                "INSERT INTO publication_items (publication_id, media_id, position) VALUES ($1, $2, $3)",
            )
            .bind(publication.id.as_str())
            .bind(item.media_id.as_str())
            .bind(item.position)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_constraint(e, "publication item"))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_items(&self, ids: &[String]) -> DbResult<HashMap<String, Vec<OrderedItem>>> {
        let rows = sqlx::query_as::<_, PublicationItemRow>(
            "SELECT publication_id, media_id, position FROM publication_items \
             WHERE publication_id = ANY($1) ORDER BY publication_id, position",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<OrderedItem>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.publication_id)
                .or_default()
                .push(OrderedItem {
                    media_id: row.media_id.into(),
                    position: row.position,
                });
        }
        Ok(grouped)
    }

    async fn with_items(&self, row: PublicationRow) -> DbResult<Publication> {
        let mut items = self.load_items(std::slice::from_ref(&row.id)).await?;
        let own = items.remove(&row.id).unwrap_or_default();
        Ok(row.into_publication(own))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, owner_id: &str, id: &PublicationId) -> DbResult<Publication> {
        let sql = format!(
            "SELECT {PUBLICATION_COLUMNS} FROM publications WHERE id = $1 AND owner_id = $2"
        );
        let row = sqlx::query_as::<_, PublicationRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("publication {id}")))?;
        self.with_items(row).await
    }

    /// List an owner's publications, optionally filtered by derived state.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        owner_id: &str,
        state: Option<PublicationState>,
    ) -> DbResult<Vec<Publication>> {
        let sql = format!(
            "SELECT {PUBLICATION_COLUMNS} FROM publications \
             WHERE owner_id = $1 AND {} ORDER BY created_at DESC, id",
            state_predicate(state)
        );
        let rows = sqlx::query_as::<_, PublicationRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut items = self.load_items(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let own = items.remove(&row.id).unwrap_or_default();
                row.into_publication(own)
            })
            .collect())
    }

    /// Run an update that only applies to unpublished rows.
    ///
    /// `NotFound` when the row does not exist for this owner, `Conflict` when
    /// it is already published.
    async fn update_unpublished(
        &self,
        owner_id: &str,
        id: &PublicationId,
        set_clause: &str,
        at: Option<DateTime<Utc>>,
    ) -> DbResult<Publication> {
        let sql = format!(
            "UPDATE publications SET {set_clause}, updated_at = now() \
             WHERE id = $1 AND owner_id = $2 AND published_at IS NULL \
             RETURNING {PUBLICATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PublicationRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.with_items(row).await,
            None => {
                // Surface NotFound for missing rows before reporting the conflict.
                self.get(owner_id, id).await?;
                Err(DbError::conflict(format!("publication {id} is already published")))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn schedule(
        &self,
        owner_id: &str,
        id: &PublicationId,
        at: DateTime<Utc>,
    ) -> DbResult<Publication> {
        self.update_unpublished(owner_id, id, "scheduled_at = $3", Some(at))
            .await
    }

    #[instrument(skip(self))]
    pub async fn unschedule(&self, owner_id: &str, id: &PublicationId) -> DbResult<Publication> {
        self.update_unpublished(owner_id, id, "scheduled_at = $3", None)
            .await
    }

    #[instrument(skip(self))]
    pub async fn publish_now(&self, owner_id: &str, id: &PublicationId) -> DbResult<Publication> {
        self.update_unpublished(owner_id, id, "published_at = $3", Some(Utc::now()))
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, owner_id: &str, id: &PublicationId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM publications WHERE id = $1 AND owner_id = $2")
            .bind(id.as_str())
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("publication {id}")));
        }
        Ok(())
    }

    /// Publish every scheduled publication whose time has come.
    #[instrument(skip(self))]
    pub async fn publish_due(&self, now: DateTime<Utc>) -> DbResult<Vec<PublicationId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE publications
            SET published_at = $1, updated_at = $1
            WHERE published_at IS NULL
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        if !ids.is_empty() {
            info!(count = ids.len(), "Published scheduled publications");
        }
        Ok(ids.into_iter().map(PublicationId::from_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates_are_disjoint() {
        assert_eq!(state_predicate(None), "TRUE");
        assert!(state_predicate(Some(PublicationState::Draft)).contains("scheduled_at IS NULL"));
        assert!(state_predicate(Some(PublicationState::Scheduled))
            .contains("scheduled_at IS NOT NULL"));
        assert_eq!(
            state_predicate(Some(PublicationState::Published)),
            "published_at IS NOT NULL"
        );
    }

    #[test]
    fn test_row_into_publication_derives_state() {
        let now = Utc::now();
        let row = PublicationRow {
            id: "pub-00001".to_string(),
            owner_id: "user-1".to_string(),
            title: "Launch".to_string(),
            description: None,
            scheduled_at: Some(now),
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        let publication = row.into_publication(vec![]);
        assert_eq!(publication.state(), PublicationState::Scheduled);
        assert!(publication.is_due(now));
    }
}
