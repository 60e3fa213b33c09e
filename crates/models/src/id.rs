use serde::{Deserialize, Serialize};

/// Declares a database row identifier: a transparent `i64` newtype that
/// serializes as a bare number and can't be confused with other id kinds.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "sqlx-support", derive(sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

row_id!(
    /// Identifies a project, the top-level owner of environments and errors.
    ProjectId
);
row_id!(
    /// Identifies an environment (production, staging, ...) within a project.
    EnvironmentId
);
row_id!(
    /// Identifies an error group.
    GroupId
);
row_id!(
    /// Identifies a single recorded error occurrence.
    LogId
);
row_id!(
    /// Identifies a dashboard user.
    UserId
);
