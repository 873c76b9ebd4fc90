//! Prometheus exposition HTTP server.
//!
//! Routes:
//!
//! - `/metrics`: every registered collector plus the exporter's own metrics
//! - `/-/healthy`: liveness
//! - `/collectors/{key}`: one collector, fetched on demand regardless of its
//!   schedule (the only way to read a collector whose interval is `disable`)

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    metrics::{error::MetricsError, opts::ServerOptions},
    registry::ExpositionRegistry,
};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

fn encoded(result: Result<String, MetricsError>) -> axum::response::Response {
    match result {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(
                event.name = "metrics.encode_failed",
                error.message = %e,
                "failed to encode metrics"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {e}"),
            )
                .into_response()
        }
    }
}

/// Handler for the `/metrics` endpoint.
async fn metrics_handler(State(registry): State<Arc<ExpositionRegistry>>) -> impl IntoResponse {
    encoded(registry.render().await)
}

/// Handler for the `/collectors/{key}` endpoint.
async fn collector_handler(
    State(registry): State<Arc<ExpositionRegistry>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match registry.render_source(&key).await {
        Some(result) => encoded(result),
        None => (
            StatusCode::NOT_FOUND,
            format!("no collector named '{key}'"),
        )
            .into_response(),
    }
}

async fn healthy_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Create the metrics HTTP router.
pub fn create_metrics_router(registry: Arc<ExpositionRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/-/healthy", get(healthy_handler))
        .route("/collectors/{key}", get(collector_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Start the Prometheus metrics HTTP server and serve until `shutdown`
/// resolves.
pub async fn start_metrics_server(
    opts: ServerOptions,
    registry: Arc<ExpositionRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), MetricsError> {
    let app = create_metrics_router(registry);

    let bind_address = opts.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| MetricsError::bind_address(&bind_address, e))?;

    info!(
        event.name = "metrics.started",
        net.listen.address = %bind_address,
        "metrics server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(MetricsError::ServeError)?;

    info!(event.name = "metrics.stopped", "metrics server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::to_bytes,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    };

    use super::{collector_handler, healthy_handler, metrics_handler};
    use crate::{
        registry::{ExpositionRegistry, PullSource},
        sample::GaugeFamily,
    };

    struct Fixed;

    #[async_trait]
    impl PullSource for Fixed {
        fn key(&self) -> &str {
            "es_fixed"
        }

        async fn collect(&self) -> Vec<GaugeFamily> {
            vec![GaugeFamily::scalar("es_fixed_up", "Did the es_fixed fetch succeed.", 1.0)]
        }
    }

    fn registry() -> Arc<ExpositionRegistry> {
        let registry = Arc::new(ExpositionRegistry::new());
        registry.register(Arc::new(Fixed)).unwrap();
        registry
    }

    async fn body(response: impl IntoResponse) -> (StatusCode, String) {
        let response = response.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text_format() {
        let (status, text) = body(metrics_handler(State(registry())).await).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("# TYPE es_fixed_up gauge"));
        assert!(text.contains("es_fixed_up 1"));
    }

    #[tokio::test]
    async fn collector_endpoint_renders_one_collector() {
        let (status, text) =
            body(collector_handler(State(registry()), Path("es_fixed".to_string())).await).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("es_fixed_up 1"));

        let (status, _) =
            body(collector_handler(State(registry()), Path("es_other".to_string())).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthy_endpoint_answers() {
        let (status, text) = body(healthy_handler().await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "OK");
    }
}
