pub mod environments;
pub mod error_groups;
pub mod error_logs;
pub mod projects;

pub use error_groups::{NotificationClaim, RecordedGroup};

/// Schema migrations of the tracker database, applied by `tracker migrate`
/// or when serving with `--migrate`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Page bounds shared by dashboard listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 500;

    /// Clamps a requested page, falling back to `default_limit` when absent.
    pub fn new(limit: Option<i64>, offset: Option<i64>, default_limit: i64) -> Self {
        Self {
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Page;

    #[test]
    fn test_page_bounds() {
        assert_eq!(Page::new(None, None, 50), Page { limit: 50, offset: 0 });
        assert_eq!(Page::new(Some(0), Some(-4), 50), Page { limit: 1, offset: 0 });
        assert_eq!(
            Page::new(Some(10_000), Some(20), 100),
            Page { limit: Page::MAX_LIMIT, offset: 20 }
        );
    }
}
