//! Shared data model of the error tracker: typed identifiers, error groups and
//! their lifecycle, individual error occurrences, and per-environment
//! notification settings.

/// Implements sqlx text encoding for an enum having `name()` and `from_str()`,
/// bound to the named Postgres enum type.
macro_rules! pg_enum {
    ($ty:ident, $pg_name:literal) => {
        #[cfg(feature = "sqlx-support")]
        impl sqlx::Type<sqlx::postgres::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                sqlx::postgres::PgTypeInfo::with_name($pg_name)
            }
        }

        #[cfg(feature = "sqlx-support")]
        impl sqlx::Encode<'_, sqlx::postgres::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<'_, sqlx::Postgres>>::encode_by_ref(&self.name(), buf)
            }
        }

        #[cfg(feature = "sqlx-support")]
        impl<'r> sqlx::Decode<'r, sqlx::postgres::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&'r str as sqlx::Decode<'r, sqlx::postgres::Postgres>>::decode(value)?;
                $ty::from_str(s)
                    .ok_or_else(|| format!("Invalid {}: {}", $pg_name, s).into())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}
pub(crate) use pg_enum;

mod groups;
mod id;
mod logs;
mod settings;

pub use groups::{ErrorGroup, GroupStatus, StatusChange};
pub use id::{EnvironmentId, GroupId, LogId, ProjectId, UserId};
pub use logs::{ErrorLog, Level, NewErrorEvent, Source};
pub use settings::{
    Environment, EnvironmentSettings, NotificationSettings, TelegramSettings, ThresholdTrigger,
    Triggers,
};

/// Project and environment that an ingested event is attributed to.
/// Resolved from the environment's API key before an event is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
pub struct IngestContext {
    pub project_id: ProjectId,
    pub environment_id: EnvironmentId,
}
