use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Per-client token buckets guarding the ingestion route.
pub type IngestLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// Builds a limiter admitting `per_minute` requests per client IP,
/// with a burst of the same size.
pub fn ingest_limiter(per_minute: NonZeroU32) -> Arc<IngestLimiter> {
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

/// Periodically forgets clients whose buckets have fully refilled.
pub async fn prune_loop(limiter: Arc<IngestLimiter>, every: std::time::Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        limiter.retain_recent();
        limiter.shrink_to_fit();
    }
}

// Middleware which denies requests of clients that exhausted their quota.
pub async fn admit(
    State(limiter): State<Arc<IngestLimiter>>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let client = client_ip(&req);

    if limiter.check_key(&client).is_err() {
        tracing::debug!(%client, "ingestion rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({"error": "rate limit exceeded"})),
        )
            .into_response();
    }
    next.run(req).await
}

fn client_ip(req: &axum::extract::Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_buckets_are_per_client() {
        let limiter = ingest_limiter(NonZeroU32::new(2).unwrap());
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }
}
