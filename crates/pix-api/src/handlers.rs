//! Request handlers.

pub mod files;
pub mod galleries;
pub mod health;
pub mod jobs;
pub mod media;
pub mod publications;

pub use health::*;

use serde::Deserialize;

/// Default and maximum page sizes for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// `?limit=&offset=` paging.
#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Paging {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_bounds() {
        let p = Paging::default();
        assert_eq!((p.limit(), p.offset()), (DEFAULT_PAGE_SIZE, 0));

        let p = Paging {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!((p.limit(), p.offset()), (MAX_PAGE_SIZE, 0));

        let p = Paging {
            limit: Some(0),
            offset: Some(20),
        };
        assert_eq!((p.limit(), p.offset()), (1, 20));
    }
}
