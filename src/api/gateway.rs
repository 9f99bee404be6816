use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    metrics,
    metrics::RequestTimer,
    schema::QuerySurface,
    GatewayError, Result,
};

/// Shared handler state: the immutable published query surface.
#[derive(Clone)]
pub struct GatewayState {
    pub surface: Arc<QuerySurface>,
}

/// One graph-style request: a field name plus its arguments.
#[derive(Debug, Deserialize)]
pub struct GraphRequest {
    pub field: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub data: Value,
}

fn gateway_router() -> Router<GatewayState> {
    Router::new()
        .route("/graphql", post(resolve_field))
        .route("/fields", get(list_fields))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn resolve_field(
    State(state): State<GatewayState>,
    Json(request): Json<GraphRequest>,
) -> Result<Json<GraphResponse>> {
    let _timer = RequestTimer::new();
    info!("resolving field: {}", request.field);

    let data = match state.surface.resolve(&request.field, &request.args).await {
        Ok(data) => data,
        Err(err) => {
            metrics::record_resolve_failure();
            return Err(err);
        }
    };

    Ok(Json(GraphResponse { data }))
}

async fn list_fields(State(state): State<GatewayState>) -> Json<Vec<String>> {
    Json(state.surface.field_names())
}

/// Bind the configured port and serve the query surface until shutdown.
pub async fn start_gateway(config: &Config, surface: Arc<QuerySurface>) -> Result<()> {
    let state = GatewayState { surface };
    let app = gateway_router().with_state(state);

    let addr = format!("0.0.0.0:{}", config.graphql_port);
    info!("Starting graph gateway on {}", addr);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        GatewayError::Internal(format!("Failed to bind to {}: {}", addr, e))
    })?;

    axum::serve(listener, app).await.map_err(|e| {
        GatewayError::Internal(format!("Server error: {}", e))
    })?;

    Ok(())
}
