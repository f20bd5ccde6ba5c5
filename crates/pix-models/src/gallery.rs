//! Gallery models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{GalleryId, MediaId};

/// Maximum length of a gallery or publication title.
pub const MAX_TITLE_LEN: usize = 200;

/// A named collection of images owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Gallery {
    pub id: GalleryId,
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_media_id: Option<MediaId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gallery {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GalleryId::new(),
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            cover_media_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// A media item's place within a gallery or publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OrderedItem {
    pub media_id: MediaId,
    pub position: i32,
}

/// Assign contiguous positions (0..n) to a list of media IDs, dropping duplicates.
///
/// The first occurrence of an ID wins.
pub fn order_items(media_ids: &[MediaId]) -> Vec<OrderedItem> {
    let mut seen = std::collections::HashSet::new();
    media_ids
        .iter()
        .filter(|id| seen.insert((*id).clone()))
        .enumerate()
        .map(|(i, id)| OrderedItem {
            media_id: id.clone(),
            position: i as i32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_items_dedups_and_numbers() {
        let a = MediaId::from_string("aaaaaaaa");
        let b = MediaId::from_string("bbbbbbbb");
        let items = order_items(&[a.clone(), b.clone(), a.clone()]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], OrderedItem { media_id: a, position: 0 });
        assert_eq!(items[1], OrderedItem { media_id: b, position: 1 });
    }
}
