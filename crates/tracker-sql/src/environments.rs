use models::{Environment, EnvironmentId, EnvironmentSettings, IngestContext, ProjectId};
use sqlx::types::Json;

/// Resolves an ingestion API key to the project and environment it belongs to.
/// Keys of deactivated environments don't resolve.
pub async fn resolve_api_key(
    api_key: &str,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<Option<IngestContext>> {
    sqlx::query_as::<_, IngestContext>(
        r#"
        select project_id, id as environment_id
        from environments
        where api_key = $1 and is_active
        "#,
    )
    .bind(api_key)
    .fetch_optional(db)
    .await
}

#[derive(sqlx::FromRow)]
struct EnvironmentRow {
    id: EnvironmentId,
    project_id: ProjectId,
    name: String,
    api_key: String,
    is_active: bool,
    settings: Json<serde_json::Value>,
}

impl From<EnvironmentRow> for Environment {
    fn from(row: EnvironmentRow) -> Self {
        let EnvironmentRow {
            id,
            project_id,
            name,
            api_key,
            is_active,
            settings: Json(settings),
        } = row;

        // Settings are edited free-form from the dashboard. A document which
        // doesn't parse leaves every notification channel disabled.
        let settings = match serde_json::from_value::<EnvironmentSettings>(settings) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(environment_id = %id, %error, "ignoring unparseable environment settings");
                EnvironmentSettings::default()
            }
        };

        Environment {
            id,
            project_id,
            name,
            api_key,
            is_active,
            settings,
        }
    }
}

pub async fn fetch_environment(
    environment_id: EnvironmentId,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<Option<Environment>> {
    let row = sqlx::query_as::<_, EnvironmentRow>(
        "select id, project_id, name, api_key, is_active, settings from environments where id = $1",
    )
    .bind(environment_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(Into::into))
}

pub async fn fetch_project_environment(
    project_id: ProjectId,
    environment_id: EnvironmentId,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<Environment>> {
    let row = sqlx::query_as::<_, EnvironmentRow>(
        r#"
        select id, project_id, name, api_key, is_active, settings
        from environments
        where project_id = $1 and id = $2
        "#,
    )
    .bind(project_id)
    .bind(environment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}
