//! Gallery persistence.
//!
//! Galleries hold an ordered list of the owner's media. Positions are kept
//! dense (0..n) so reorders and removals never leave gaps.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pix_models::{order_items, Gallery, GalleryId, MediaId, OrderedItem};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use crate::error::{DbError, DbResult};
use crate::media::map_constraint;

const GALLERY_COLUMNS: &str =
    "id, owner_id, name, description, cover_media_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct GalleryRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub cover_media_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GalleryRow> for Gallery {
    fn from(row: GalleryRow) -> Self {
        Gallery {
            id: GalleryId::from_string(row.id),
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            cover_media_id: row.cover_media_id.map(MediaId::from_string),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ItemRow {
    pub media_id: String,
    pub position: i32,
}

impl From<ItemRow> for OrderedItem {
    fn from(row: ItemRow) -> Self {
        OrderedItem {
            media_id: MediaId::from_string(row.media_id),
            position: row.position,
        }
    }
}

/// Partial update. `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct GalleryUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub cover_media_id: Option<Option<MediaId>>,
}

impl GalleryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.cover_media_id.is_none()
    }

    fn apply(self, gallery: &mut Gallery) {
        if let Some(name) = self.name {
            gallery.name = name;
        }
        if let Some(description) = self.description {
            gallery.description = description;
        }
        if let Some(cover) = self.cover_media_id {
            gallery.cover_media_id = cover;
        }
    }
}

/// Check that `new_order` is a permutation of `current`.
pub(crate) fn check_permutation(current: &[MediaId], new_order: &[MediaId]) -> DbResult<()> {
    let unique: HashSet<&MediaId> = new_order.iter().collect();
    if unique.len() != new_order.len() {
        return Err(DbError::invalid_input("duplicate media id in order"));
    }
    let existing: HashSet<&MediaId> = current.iter().collect();
    if unique != existing {
        return Err(DbError::invalid_input(
            "order must list exactly the current items",
        ));
    }
    Ok(())
}

pub(crate) async fn ensure_media_owned(
    tx: &mut Transaction<'_, Postgres>,
    owner_id: &str,
    ids: &[MediaId],
) -> DbResult<()> {
    let keys: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM media WHERE owner_id = $1 AND id = ANY($2)")
            .bind(owner_id)
            .bind(&keys)
            .fetch_one(&mut **tx)
            .await?;

    let unique: HashSet<&MediaId> = ids.iter().collect();
    if count as usize != unique.len() {
        return Err(DbError::not_found("one or more media items"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct GalleryRepository {
    pool: PgPool,
}

impl GalleryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, gallery), fields(gallery_id = %gallery.id))]
    pub async fn create(&self, gallery: &Gallery) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        if let Some(cover) = &gallery.cover_media_id {
            ensure_media_owned(&mut tx, &gallery.owner_id, std::slice::from_ref(cover)).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO galleries (id, owner_id, name, description, cover_media_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(gallery.id.as_str())
        .bind(&gallery.owner_id)
        .bind(&gallery.name)
        .bind(&gallery.description)
        .bind(gallery.cover_media_id.as_ref().map(|id| id.as_str()))
        .bind(gallery.created_at)
        .bind(gallery.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_constraint(e, "gallery"))?;

        tx.commit().await?;
        debug!("Created gallery");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, owner_id: &str, id: &GalleryId) -> DbResult<Gallery> {
        let sql = format!("SELECT {GALLERY_COLUMNS} FROM galleries WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, GalleryRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Gallery::from)
            .ok_or_else(|| DbError::not_found(format!("gallery {id}")))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, owner_id: &str) -> DbResult<Vec<Gallery>> {
        let sql = format!(
            "SELECT {GALLERY_COLUMNS} FROM galleries WHERE owner_id = $1 ORDER BY created_at DESC, id"
        );
        let rows = sqlx::query_as::<_, GalleryRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Gallery::from).collect())
    }

    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        owner_id: &str,
        id: &GalleryId,
        update: GalleryUpdate,
    ) -> DbResult<Gallery> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {GALLERY_COLUMNS} FROM galleries WHERE id = $1 AND owner_id = $2 FOR UPDATE"
        );
        let mut gallery: Gallery = sqlx::query_as::<_, GalleryRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(Gallery::from)
            .ok_or_else(|| DbError::not_found(format!("gallery {id}")))?;

        if let Some(Some(cover)) = &update.cover_media_id {
            ensure_media_owned(&mut tx, owner_id, std::slice::from_ref(cover)).await?;
        }
        update.apply(&mut gallery);

        let sql = format!(
            "UPDATE galleries SET name = $3, description = $4, cover_media_id = $5, updated_at = now() \
             WHERE id = $1 AND owner_id = $2 RETURNING {GALLERY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GalleryRow>(&sql)
            .bind(id.as_str())
            .bind(owner_id)
            .bind(&gallery.name)
            .bind(&gallery.description)
            .bind(gallery.cover_media_id.as_ref().map(|id| id.as_str()))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, owner_id: &str, id: &GalleryId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM galleries WHERE id = $1 AND owner_id = $2")
            .bind(id.as_str())
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("gallery {id}")));
        }
        Ok(())
    }

    async fn lock_gallery(
        tx: &mut Transaction<'_, Postgres>,
        owner_id: &str,
        id: &GalleryId,
    ) -> DbResult<()> {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT id FROM galleries WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(id.as_str())
        .bind(owner_id)
        .fetch_optional(&mut **tx)
        .await?;

        found
            .map(|_| ())
            .ok_or_else(|| DbError::not_found(format!("gallery {id}")))
    }

    async fn current_items(
        tx: &mut Transaction<'_, Postgres>,
        id: &GalleryId,
    ) -> DbResult<Vec<OrderedItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            "SELECT media_id, position FROM gallery_items WHERE gallery_id = $1 ORDER BY position",
        )
        .bind(id.as_str())
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(OrderedItem::from).collect())
    }

    /// Append media to the end of the gallery. Items already present are skipped.
    #[instrument(skip(self, media_ids), fields(count = media_ids.len()))]
    pub async fn add_items(
        &self,
        owner_id: &str,
        id: &GalleryId,
        media_ids: &[MediaId],
    ) -> DbResult<Vec<OrderedItem>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_gallery(&mut tx, owner_id, id).await?;
        ensure_media_owned(&mut tx, owner_id, media_ids).await?;

        let existing = Self::current_items(&mut tx, id).await?;
        let present: HashSet<&MediaId> = existing.iter().map(|i| &i.media_id).collect();
        let mut next = existing.len() as i32;

        for item in order_items(media_ids) {
            if present.contains(&item.media_id) {
                continue;
            }
            sqlx::query(
                "INSERT INTO gallery_items (gallery_id, media_id, position) VALUES ($1, $2, $3)",
            )
            .bind(id.as_str())
            .bind(item.media_id.as_str())
            .bind(next)
            .execute(&mut *tx)
            .await?;
            next += 1;
        }

        sqlx::query("UPDATE galleries SET updated_at = now() WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let items = Self::current_items(&mut tx, id).await?;
        tx.commit().await?;
        Ok(items)
    }

    /// Remove one item and close the gap it leaves.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner_id: &str,
        id: &GalleryId,
        media_id: &MediaId,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::lock_gallery(&mut tx, owner_id, id).await?;

        let position: Option<i32> = sqlx::query_scalar(
            "DELETE FROM gallery_items WHERE gallery_id = $1 AND media_id = $2 RETURNING position",
        )
        .bind(id.as_str())
        .bind(media_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(position) = position else {
            return Err(DbError::not_found(format!("media {media_id} in gallery {id}")));
        };

        sqlx::query(
            "UPDATE gallery_items SET position = position - 1 WHERE gallery_id = $1 AND position > $2",
        )
        .bind(id.as_str())
        .bind(position)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE galleries SET updated_at = now() WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Items in position order.
    #[instrument(skip(self))]
    pub async fn items(&self, owner_id: &str, id: &GalleryId) -> DbResult<Vec<OrderedItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT gi.media_id, gi.position
            FROM gallery_items gi
            JOIN galleries g ON g.id = gi.gallery_id
            WHERE g.id = $1 AND g.owner_id = $2
            ORDER BY gi.position
            "#,
        )
        .bind(id.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            // Distinguish an empty gallery from a missing one.
            self.get(owner_id, id).await?;
        }
        Ok(rows.into_iter().map(OrderedItem::from).collect())
    }

    /// Replace the item order. `media_ids` must list exactly the current items.
    #[instrument(skip(self, media_ids), fields(count = media_ids.len()))]
    pub async fn reorder(
        &self,
        owner_id: &str,
        id: &GalleryId,
        media_ids: &[MediaId],
    ) -> DbResult<Vec<OrderedItem>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_gallery(&mut tx, owner_id, id).await?;

        let current: Vec<MediaId> = Self::current_items(&mut tx, id)
            .await?
            .into_iter()
            .map(|i| i.media_id)
            .collect();
        check_permutation(&current, media_ids)?;

        for item in order_items(media_ids) {
            sqlx::query(
                "UPDATE gallery_items SET position = $3 WHERE gallery_id = $1 AND media_id = $2",
            )
            .bind(id.as_str())
            .bind(item.media_id.as_str())
            .bind(item.position)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE galleries SET updated_at = now() WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let items = Self::current_items(&mut tx, id).await?;
        tx.commit().await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<MediaId> {
        names.iter().map(|n| MediaId::from_string(*n)).collect()
    }

    #[test]
    fn test_permutation_accepts_reordering() {
        let current = ids(&["a", "b", "c"]);
        assert!(check_permutation(&current, &ids(&["c", "a", "b"])).is_ok());
    }

    #[test]
    fn test_permutation_rejects_missing_and_extra() {
        let current = ids(&["a", "b", "c"]);
        assert!(check_permutation(&current, &ids(&["a", "b"])).is_err());
        assert!(check_permutation(&current, &ids(&["a", "b", "c", "d"])).is_err());
        assert!(check_permutation(&current, &ids(&["a", "b", "d"])).is_err());
    }

    #[test]
    fn test_permutation_rejects_duplicates() {
        let current = ids(&["a", "b", "c"]);
        assert!(matches!(
            check_permutation(&current, &ids(&["a", "a", "b", "c"])),
            Err(DbError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_update_apply() {
        let mut gallery = Gallery::new("user-1", "Old").with_description(Some("desc".into()));
        GalleryUpdate {
            name: Some("New".into()),
            description: Some(None),
            cover_media_id: None,
        }
        .apply(&mut gallery);
        assert_eq!(gallery.name, "New");
        assert!(gallery.description.is_none());
        assert!(gallery.cover_media_id.is_none());
    }
}
