//! Publishes scheduled publications when they come due.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use metrics::counter;
use tokio::sync::watch;
use tracing::{error, info};

use pix_db::PublicationRepository;

use crate::retry::FailureTracker;

pub struct PublicationScheduler {
    publications: PublicationRepository,
    interval: Duration,
}

impl PublicationScheduler {
    pub fn new(publications: PublicationRepository, interval: Duration) -> Self {
        Self {
            publications,
            interval,
        }
    }

    /// Publish everything due now. Returns how many were published.
    pub async fn tick(&self) -> anyhow::Result<usize> {
        let published = self
            .publications
            .publish_due(Utc::now())
            .await
            .context("publishing due publications")?;

        for id in &published {
            info!(publication_id = %id, "Publication went live");
        }
        counter!("pixvault_publications_published_total").increment(published.len() as u64);
        Ok(published.len())
    }

    /// Tick on the configured interval until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Publication scheduler started (interval {:?})", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        let mut failures = FailureTracker::new(5);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(_) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Publication scheduler tick failed: {:#}", e);
                            }
                        }
                    }
                }
            }
        }
        info!("Publication scheduler stopped");
    }
}
