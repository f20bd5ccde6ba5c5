//! Media item persistence.

use chrono::{DateTime, Utc};
use pix_models::{MediaId, MediaItem, MediaKind};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use crate::error::{DbError, DbResult};

const MEDIA_COLUMNS: &str = "id, owner_id, kind, filename, content_type, storage_key, size_bytes, \
     width, height, duration_secs, derived_from, created_at";

/// Row as stored in `media`.
#[derive(Debug, Clone, FromRow)]
pub struct MediaRow {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub filename: String,
    pub content_type: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_secs: Option<f64>,
    pub derived_from: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn dimension(value: Option<i32>, column: &str) -> DbResult<Option<u32>> {
    value
        .map(|v| u32::try_from(v).map_err(|_| DbError::decode(format!("negative {column}: {v}"))))
        .transpose()
}

impl TryFrom<MediaRow> for MediaItem {
    type Error = DbError;

    fn try_from(row: MediaRow) -> DbResult<Self> {
        let kind: MediaKind = row.kind.parse().map_err(DbError::decode)?;
        Ok(MediaItem {
            id: MediaId::from_string(row.id),
            owner_id: row.owner_id,
            kind,
            filename: row.filename,
            content_type: row.content_type,
            storage_key: row.storage_key,
            size_bytes: row.size_bytes,
            width: dimension(row.width, "width")?,
            height: dimension(row.height, "height")?,
            duration_secs: row.duration_secs,
            derived_from: row.derived_from.map(MediaId::from_string),
            created_at: row.created_at,
        })
    }
}

fn to_i32(value: Option<u32>) -> Option<i32> {
    value.map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

/// Map a unique or foreign key violation to a domain error.
pub(crate) fn map_constraint(err: sqlx::Error, what: &str) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return DbError::conflict(format!("{what} already exists"));
        }
        if db_err.is_foreign_key_violation() {
            return DbError::invalid_input(format!("{what} references a missing row"));
        }
    }
    DbError::Sqlx(err)
}

#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, item), fields(media_id = %item.id))]
    pub async fn insert(&self, item: &MediaItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media (
                id, owner_id, kind, filename, content_type, storage_key, size_bytes,
                width, height, duration_secs, derived_from, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.id.as_str())
        .bind(&item.owner_id)
        .bind(item.kind.as_str())
        .bind(&item.filename)
        .bind(&item.content_type)
        .bind(&item.storage_key)
        .bind(item.size_bytes)
        .bind(to_i32(item.width))
        .bind(to_i32(item.height))
        .bind(item.duration_secs)
        .bind(item.derived_from.as_ref().map(|id| id.as_str()))
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "media item"))?;

        debug!("Inserted media item");
        Ok(())
    }

    /// Fetch an item owned by `owner_id`.
    #[instrument(skip(self))]
    pub async fn get(&self, owner_id: &str, id: &MediaId) -> DbResult<MediaItem> {
        let sql = format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, MediaRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("media {id}")))?
            .try_into()
    }

    /// List an owner's items, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        owner_id: &str,
        kind: Option<MediaKind>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<MediaItem>> {
        let sql = format!(
            "SELECT {MEDIA_COLUMNS} FROM media \
             WHERE owner_id = $1 AND ($2::text IS NULL OR kind = $2) \
             ORDER BY created_at DESC, id \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, MediaRow>(&sql)
            .bind(owner_id)
            .bind(kind.map(|k| k.as_str()))
            .bind(limit.max(0))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(MediaItem::try_from).collect()
    }

    /// Fetch several items, in the order of `ids`.
    ///
    /// Fails with `NotFound` if any id is missing or belongs to someone else.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_many(&self, owner_id: &str, ids: &[MediaId]) -> DbResult<Vec<MediaItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let sql = format!("SELECT {MEDIA_COLUMNS} FROM media WHERE owner_id = $1 AND id = ANY($2)");
        let rows = sqlx::query_as::<_, MediaRow>(&sql)
            .bind(owner_id)
            .bind(&keys)
            .fetch_all(&self.pool)
            .await?;

        let mut found: std::collections::HashMap<String, MediaItem> = rows
            .into_iter()
            .map(|row| MediaItem::try_from(row).map(|item| (item.id.0.clone(), item)))
            .collect::<DbResult<_>>()?;

        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            match found.remove(id.as_str()) {
                Some(item) => ordered.push(item),
                None if ordered.iter().any(|m: &MediaItem| &m.id == id) => {}
                None => return Err(DbError::not_found(format!("media {id}"))),
            }
        }
        Ok(ordered)
    }

    /// Delete an item and return the removed row.
    #[instrument(skip(self))]
    pub async fn delete(&self, owner_id: &str, id: &MediaId) -> DbResult<MediaItem> {
        let sql =
            format!("DELETE FROM media WHERE id = $1 AND owner_id = $2 RETURNING {MEDIA_COLUMNS}");
        sqlx::query_as::<_, MediaRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found(format!("media {id}")))?
            .try_into()
    }

    /// Count how many of `ids` the owner has.
    pub async fn count_owned(&self, owner_id: &str, ids: &[MediaId]) -> DbResult<i64> {
        let keys: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM media WHERE owner_id = $1 AND id = ANY($2)",
        )
        .bind(owner_id)
        .bind(&keys)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
