//! Identifier newtypes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(
    /// Unique identifier for a transformation job.
    JobId
);
define_id!(
    /// Unique identifier for an uploaded or derived media item.
    MediaId
);
define_id!(
    /// Unique identifier for a gallery.
    GalleryId
);
define_id!(
    /// Unique identifier for a publication.
    PublicationId
);

/// Check that a path segment looks like an ID we issued.
///
/// Accepts ASCII alphanumerics and hyphens, 8-64 chars.
pub fn is_valid_id(id: &str) -> bool {
    if id.len() < 8 || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique_and_valid() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(is_valid_id(a.as_str()));
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = MediaId::from_string("abc-12345");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-12345\"");
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("short"));
        assert!(!is_valid_id("../../etc/passwd"));
        assert!(!is_valid_id("has_underscore1"));
        assert!(!is_valid_id(&"a".repeat(65)));
    }
}
