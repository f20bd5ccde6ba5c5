//! Repository tests against a live PostgreSQL.
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p pix-db -- --ignored

use chrono::{Duration, Utc};
use pix_db::{Database, DatabaseConfig, DbError, GalleryUpdate};
use pix_models::{
    Gallery, Job, JobRequest, JobResult, JobStatus, MediaId, MediaItem, MediaKind, OrderedItem,
    Publication, PublicationState, ResizeRequest, ResizeResult,
};

async fn database() -> Database {
    dotenvy::dotenv().ok();
    let config = DatabaseConfig::from_env().expect("DATABASE_URL must be set");
    let db = Database::connect(&config).await.expect("Failed to connect");
    db.migrate().await.expect("Failed to migrate");
    db
}

fn owner() -> String {
    format!("test-user-{}", MediaId::new())
}

async fn insert_image(db: &Database, owner: &str, name: &str) -> MediaItem {
    let id = MediaId::new();
    let item = MediaItem::new(
        owner,
        MediaKind::Image,
        name,
        "image/png",
        format!("users/{owner}/originals/{id}.png"),
        100,
    )
    .with_id(id)
    .with_dimensions(64, 48);
    db.media().insert(&item).await.expect("insert media");
    item
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_media_is_owner_scoped() {
    let db = database().await;
    let alice = owner();
    let bob = owner();
    let item = insert_image(&db, &alice, "a.png").await;

    let fetched = db.media().get(&alice, &item.id).await.unwrap();
    assert_eq!(fetched.width, Some(64));
    assert!(matches!(
        db.media().get(&bob, &item.id).await,
        Err(DbError::NotFound(_))
    ));

    let listed = db.media().list(&alice, Some(MediaKind::Image), 10, 0).await.unwrap();
    assert_eq!(listed.len(), 1);

    db.media().delete(&alice, &item.id).await.unwrap();
    assert!(db.media().list(&alice, None, 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_gallery_items_stay_dense() {
    let db = database().await;
    let owner = owner();
    let a = insert_image(&db, &owner, "a.png").await;
    let b = insert_image(&db, &owner, "b.png").await;
    let c = insert_image(&db, &owner, "c.png").await;

    let gallery = Gallery::new(&owner, "Trip");
    db.galleries().create(&gallery).await.unwrap();

    let items = db
        .galleries()
        .add_items(&owner, &gallery.id, &[a.id.clone(), b.id.clone(), a.id.clone()])
        .await
        .unwrap();
    assert_eq!(items.len(), 2);

    let items = db
        .galleries()
        .add_items(&owner, &gallery.id, &[c.id.clone()])
        .await
        .unwrap();
    assert_eq!(items[2], OrderedItem { media_id: c.id.clone(), position: 2 });

    db.galleries().remove_item(&owner, &gallery.id, &a.id).await.unwrap();
    let items = db.galleries().items(&owner, &gallery.id).await.unwrap();
    let positions: Vec<i32> = items.iter().map(|i| i.position).collect();
    assert_eq!(positions, vec![0, 1]);

    let items = db
        .galleries()
        .reorder(&owner, &gallery.id, &[c.id.clone(), b.id.clone()])
        .await
        .unwrap();
    assert_eq!(items[0].media_id, c.id);

    assert!(matches!(
        db.galleries().reorder(&owner, &gallery.id, &[c.id.clone()]).await,
        Err(DbError::InvalidInput(_))
    ));

    let updated = db
        .galleries()
        .update(
            &owner,
            &gallery.id,
            GalleryUpdate {
                cover_media_id: Some(Some(b.id.clone())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.cover_media_id, Some(b.id));

    db.galleries().delete(&owner, &gallery.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_publication_schedule_and_publish_due() {
    let db = database().await;
    let owner = owner();
    let a = insert_image(&db, &owner, "a.png").await;

    let publication = Publication::new(&owner, "Launch")
        .with_items(pix_models::order_items(&[a.id.clone()]));
    db.publications().create(&publication).await.unwrap();

    let scheduled = db
        .publications()
        .schedule(&owner, &publication.id, Utc::now() - Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(scheduled.state(), PublicationState::Scheduled);

    let published = db.publications().publish_due(Utc::now()).await.unwrap();
    assert!(published.contains(&publication.id));

    let fetched = db.publications().get(&owner, &publication.id).await.unwrap();
    assert_eq!(fetched.state(), PublicationState::Published);
    assert_eq!(fetched.items.len(), 1);

    assert!(matches!(
        db.publications().unschedule(&owner, &publication.id).await,
        Err(DbError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_job_lifecycle() {
    let db = database().await;
    let owner = owner();
    let request = JobRequest::Resize(ResizeRequest::new(MediaId::new(), Some(100), None));
    let job = Job::new(&owner, request);
    db.jobs().insert(&job).await.unwrap();

    let processing = db.jobs().mark_processing(&job.id).await.unwrap().unwrap();
    assert_eq!(processing.status, JobStatus::Processing);
    assert_eq!(processing.attempts, 1);

    // A second worker cannot claim it.
    assert!(db.jobs().mark_processing(&job.id).await.unwrap().is_none());

    assert!(db.jobs().update_progress(&job.id, 50).await.unwrap());

    let result = JobResult::Resize(ResizeResult {
        media_id: MediaId::new(),
        width: 100,
        height: 75,
    });
    let completed = db.jobs().mark_completed(&job.id, &result).await.unwrap().unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(completed.progress, 100);

    assert!(matches!(
        db.jobs().retry(&owner, &job.id).await,
        Err(DbError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_failed_job_retry_and_stale() {
    let db = database().await;
    let owner = owner();
    let request = JobRequest::Resize(ResizeRequest::new(MediaId::new(), Some(100), None));
    let job = Job::new(&owner, request);
    db.jobs().insert(&job).await.unwrap();

    db.jobs().mark_processing(&job.id).await.unwrap();
    let failed = db.jobs().mark_failed(&job.id, "boom").await.unwrap().unwrap();
    assert_eq!(failed.error.as_deref(), Some("boom"));

    let retried = db.jobs().retry(&owner, &job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempts, 0);

    db.jobs().mark_processing(&job.id).await.unwrap();
    sqlx::query("UPDATE jobs SET updated_at = now() - interval '2 hours' WHERE id = $1")
        .bind(job.id.as_str())
        .execute(db.pool())
        .await
        .unwrap();
    let stale = db
        .jobs()
        .fail_stale(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert!(stale.contains(&job.id));
    let job = db.jobs().get(&owner, &job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_unqueued_job_fails_and_can_be_retried() {
    let db = database().await;
    let owner = owner();
    let request = JobRequest::Resize(ResizeRequest::new(MediaId::new(), Some(100), None));
    let job = Job::new(&owner, request);
    db.jobs().insert(&job).await.unwrap();

    // Only pending jobs are affected; the processing-only transition leaves it alone.
    assert!(db.jobs().mark_failed(&job.id, "boom").await.unwrap().is_none());

    let failed = db
        .jobs()
        .fail_unqueued(&job.id, "could not enqueue: connection refused")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.completed_at.is_some());

    // A second call finds nothing pending.
    assert!(db.jobs().fail_unqueued(&job.id, "again").await.unwrap().is_none());

    let retried = db.jobs().retry(&owner, &job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert!(retried.error.is_none());
}
