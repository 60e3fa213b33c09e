use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Context;
use axum::{http::StatusCode, response::IntoResponse};
use models::{ProjectId, UserId};
use tracker_sql::projects::ProjectRole;

use crate::alerts::{NotificationQueue, Notifier, Sender};
use crate::Store;

mod admission;
mod error;
mod groups;
mod ingest;
mod logs;
mod notifications;

pub use admission::{ingest_limiter, prune_loop, IngestLimiter};
pub use error::{ApiError, ApiErrorExt};

/// Request wraps a JSON-deserialized request type T which
/// also implements the validator::Validate trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct Request<T>(pub T);

/// Claims are the JWT claims of dashboard access tokens.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Claims {
    /// Numeric id of the user, as a string.
    pub sub: String,
    pub exp: usize,
}

/// The authenticated dashboard user of a request.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: UserId,
}

/// Rejection is an error type of reasons why an API request may fail.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    JsonError(#[from] axum::extract::rejection::JsonRejection),
}

pub struct App {
    store: Arc<dyn Store>,
    queue: Arc<NotificationQueue>,
    notifier: Arc<Notifier<Sender>>,
    pg_pool: sqlx::PgPool,
    jwt_secret: jsonwebtoken::DecodingKey,
    jwt_validation: jsonwebtoken::Validation,
}

/// Build the tracker's API router.
pub fn build_router(
    store: Arc<dyn Store>,
    queue: Arc<NotificationQueue>,
    notifier: Arc<Notifier<Sender>>,
    pg_pool: sqlx::PgPool,
    jwt_secret: Vec<u8>,
    allow_origin: &[String],
    ingest_quota: NonZeroU32,
) -> anyhow::Result<axum::Router<()>> {
    let app = Arc::new(App {
        store,
        queue,
        notifier,
        pg_pool,
        jwt_secret: jsonwebtoken::DecodingKey::from_secret(&jwt_secret),
        jwt_validation: jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256),
    });

    let limiter = admission::ingest_limiter(ingest_quota);
    tokio::spawn(admission::prune_loop(
        limiter.clone(),
        std::time::Duration::from_secs(60),
    ));

    let allow_origin = allow_origin
        .iter()
        .map(|o| o.parse())
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse allowed origins")?;

    let allow_headers = [
        axum::http::header::AUTHORIZATION,
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderName::from_static(ingest::API_KEY_HEADER),
    ];

    let cors = tower_http::cors::CorsLayer::new()
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_origin(tower_http::cors::AllowOrigin::list(allow_origin))
        .allow_headers(allow_headers);

    use axum::routing::{get, patch, post};

    let ingest_router = axum::Router::new()
        .route("/api/log", post(ingest::log_error))
        .route_layer(axum::middleware::from_fn_with_state(
            app.clone(),
            ingest::authorize_api_key,
        ))
        .route_layer(axum::middleware::from_fn_with_state(limiter, admission::admit));

    let dashboard_router = axum::Router::new()
        .route("/api/projects/{id}/error-groups", get(groups::list_groups))
        .route(
            "/api/projects/{id}/error-groups/{group_id}",
            get(groups::get_group),
        )
        .route(
            "/api/projects/{id}/error-groups/{group_id}/occurrences",
            get(groups::list_occurrences),
        )
        .route(
            "/api/projects/{id}/error-groups/{group_id}/resolve",
            patch(groups::resolve_group),
        )
        .route(
            "/api/projects/{id}/error-groups/{group_id}/ignore",
            patch(groups::ignore_group),
        )
        .route(
            "/api/projects/{id}/error-groups/{group_id}/reopen",
            patch(groups::reopen_group),
        )
        .route("/api/projects/{id}/errors", get(logs::list_logs))
        .route("/api/projects/{id}/errors/{error_id}", get(logs::get_log))
        .route(
            "/api/projects/{id}/errors/{error_id}/resolve",
            patch(logs::resolve_log),
        )
        .route(
            "/api/projects/{id}/environments/{env_id}/notifications/test",
            post(notifications::send_test),
        )
        .route(
            "/api/projects/{id}/environments/{env_id}/notifications/history",
            get(notifications::history),
        )
        .route_layer(axum::middleware::from_fn_with_state(app.clone(), authorize));

    let router = axum::Router::new()
        .merge(ingest_router)
        .merge(dashboard_router)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .on_failure(tower_http::trace::DefaultOnFailure::new().level(tracing::Level::INFO)),
        )
        .layer(cors)
        .with_state(app);

    Ok(router)
}

impl<T, S> axum::extract::FromRequest<S> for Request<T>
where
    T: serde::de::DeserializeOwned + validator::Validate,
    S: Send + Sync,
    axum::extract::Json<T>:
        axum::extract::FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
{
    type Rejection = Rejection;

    async fn from_request(req: axum::extract::Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Json(value) = axum::extract::Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Request(value))
    }
}

impl axum::response::IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        ApiError::from(self).into_response()
    }
}

// Middleware which validates JWT tokens before proceeding, and attaches the verified UserContext.
async fn authorize(
    axum::extract::State(app): axum::extract::State<Arc<App>>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let user = match verify_bearer(&app, req.headers()) {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}

fn verify_bearer(app: &App, headers: &axum::http::HeaderMap) -> Result<UserContext, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let claims = jsonwebtoken::decode::<Claims>(token, &app.jwt_secret, &app.jwt_validation)
        .map_err(|err| ApiError::unauthorized(format!("failed to parse authorization token: {err}")))?
        .claims;

    let user_id = claims
        .sub
        .parse::<UserId>()
        .map_err(|_| ApiError::unauthorized("authorization token subject is not a user id"))?;

    Ok(UserContext { user_id })
}

/// Fetches the user's role within the project. Projects the user can't
/// access are reported as not found.
async fn project_role(
    app: &App,
    project_id: ProjectId,
    user: &UserContext,
) -> Result<ProjectRole, ApiError> {
    tracker_sql::projects::fetch_role(project_id, user.user_id, &app.pg_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("project"))
}

async fn require_admin(
    app: &App,
    project_id: ProjectId,
    user: &UserContext,
) -> Result<ProjectRole, ApiError> {
    let role = project_role(app, project_id, user).await?;
    if !role.is_admin() {
        return Err(anyhow::anyhow!("only project owners and admins may manage notifications")
            .with_status(StatusCode::FORBIDDEN));
    }
    Ok(role)
}
