//! Health and metrics endpoint.
//!
//! - `GET /health`: 200 `ok` when the keeper is healthy, 503 `unhealthy` otherwise
//! - `GET /metrics`: Prometheus text format

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use keeper_engine::TriggerKeeper;
use keeper_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppResult;

/// Create the axum router.
pub fn create_router(keeper: TriggerKeeper) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(keeper)
}

/// Serve the endpoint until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    keeper: TriggerKeeper,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Health server listening");

    axum::serve(listener, create_router(keeper))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Health server stopped");
    Ok(())
}

async fn health(State(keeper): State<TriggerKeeper>) -> (StatusCode, &'static str) {
    if keeper.health_check().await {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

async fn metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::Slot;
    use keeper_engine::{KeeperConfig, KeeperDeps};
    use keeper_venue::mock::{
        ManualSlotSource, MockAccountSource, MockSnapshotBuilder, MockVenueClient,
    };
    use keeper_venue::MemoryAccountIndexFactory;
    use std::sync::Arc;

    fn keeper(venue: Arc<MockVenueClient>) -> TriggerKeeper {
        let deps = KeeperDeps::new(
            venue,
            Arc::new(MemoryAccountIndexFactory::new(Arc::new(MockAccountSource::new(
                Vec::new(),
            )))),
            Arc::new(MockSnapshotBuilder::new()),
            Arc::new(ManualSlotSource::new(Slot(0))),
        );
        TriggerKeeper::new(
            KeeperConfig {
                name: "health-endpoint-test".to_string(),
                ..KeeperConfig::default()
            },
            deps,
        )
    }

    #[tokio::test]
    async fn test_health_reflects_keeper_state() {
        let venue = Arc::new(MockVenueClient::new());
        let keeper = keeper(venue.clone());
        keeper.init().await.unwrap();

        let (status, body) = health(State(keeper.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "unhealthy");

        keeper.run_cycle().await.unwrap();
        let (status, body) = health(State(keeper.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        venue.set_subaccount_count(3);
        let (status, _) = health(State(keeper)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let response = metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
