//! Publication models.
//!
//! A publication is an ordered set of images prepared for external release.
//! It is either a draft, scheduled for a future time, or published.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::gallery::OrderedItem;
use crate::PublicationId;

/// Publication lifecycle state, derived from its timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PublicationState {
    Draft,
    Scheduled,
    Published,
}

impl PublicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationState::Draft => "draft",
            PublicationState::Scheduled => "scheduled",
            PublicationState::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Publication {
    pub id: PublicationId,
    pub owner_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<OrderedItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PublicationId::new(),
            owner_id: owner_id.into(),
            title: title.into(),
            description: None,
            scheduled_at: None,
            published_at: None,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_items(mut self, items: Vec<OrderedItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_schedule(mut self, scheduled_at: Option<DateTime<Utc>>) -> Self {
        self.scheduled_at = scheduled_at;
        self
    }

    /// State relative to `now`.
    ///
    /// A schedule that has already passed but was not yet picked up by the
    /// scheduler still reads as `Scheduled`; publishing is an explicit write.
    pub fn state(&self) -> PublicationState {
        if self.published_at.is_some() {
            PublicationState::Published
        } else if self.scheduled_at.is_some() {
            PublicationState::Scheduled
        } else {
            PublicationState::Draft
        }
    }

    /// Whether the scheduler should publish this now.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.published_at.is_none() && self.scheduled_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_state_derivation() {
        let mut p = Publication::new("user-1", "Spring");
        assert_eq!(p.state(), PublicationState::Draft);

        p.scheduled_at = Some(Utc::now() + Duration::hours(1));
        assert_eq!(p.state(), PublicationState::Scheduled);
        assert!(!p.is_due(Utc::now()));

        p.published_at = Some(Utc::now());
        assert_eq!(p.state(), PublicationState::Published);
        assert!(!p.is_due(Utc::now() + Duration::hours(2)));
    }

    #[test]
    fn test_due_when_schedule_passed() {
        let p = Publication::new("user-1", "Autumn")
            .with_schedule(Some(Utc::now() - Duration::minutes(1)));
        assert!(p.is_due(Utc::now()));
    }
}
