//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ControlError;
use crate::server::handlers::*;
use crate::server::state::ServerState;

/// All API routes
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Nodes
        .route("/nodes", get(list_nodes_handler).post(create_node_handler))
        .route(
            "/nodes/{id}",
            get(show_node_handler)
                .patch(update_node_handler)
                .delete(delete_node_handler),
        )
        .route("/nodes/{id}/decommission", post(decommission_node_handler))
        .route("/nodes/{id}/health", get(node_health_handler))
        .route("/nodes/{id}/containers", get(containers_handler))
        .route("/nodes/{id}/containers/{cid}", get(container_inspect_handler))
        .route("/nodes/{id}/containers/{cid}/logs", get(container_logs_handler))
        // Deployments
        .route(
            "/deployments",
            get(list_deployments_handler).post(create_deployment_handler),
        )
        .route(
            "/deployments/{id}",
            get(show_deployment_handler)
                .patch(update_deployment_handler)
                .delete(delete_deployment_handler),
        )
        .route("/deployments/{id}/status", get(deployment_status_handler))
        .route(
            "/deployments/{id}/decommission",
            post(decommission_deployment_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ControlError>>, ControlError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ControlError::ServerError(format!("{}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ControlError::ServerError(e.to_string()))
    });

    Ok(handle)
}
