//! HTTP surface: app state, router wiring, and the sync fallback endpoints
//!
//! When the push channel is down clients fall back to `GET /sync` for a full
//! snapshot and `POST /sync/changes` to submit mutations. Both answer the
//! same shapes the push channel uses, wrapped in a `{success, ...}` body.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{Credentials, Identity, ResolverChain};
use crate::config::ServerConfig;
use crate::store::SyncStore;
use crate::types::{EntityChange, Snapshot};

use super::limiter::RateLimiter;
use super::registry::{self, ClientRegistry};
use super::router::{ChangeRouter, RouterHandle};
use super::snapshot::SnapshotService;
use super::ws::ws_handler;

/// Shared state behind every endpoint
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub snapshots: SnapshotService,
    pub router: RouterHandle,
    pub resolvers: ResolverChain,
    pub limiter: RateLimiter,
}

impl AppState {
    /// Build the state and spawn the router flush and liveness-sweep tasks.
    /// The tasks live as long as the process; their lifecycle is tied to
    /// server startup, not reached through ambient globals.
    pub fn build(
        store: Arc<dyn SyncStore>,
        resolvers: ResolverChain,
        config: &ServerConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(ClientRegistry::new());

        let (router, router_task) =
            ChangeRouter::new(registry.clone(), store.clone(), config.router());
        tokio::spawn(router_task.run());
        tokio::spawn(registry::run_sweeper(
            registry.clone(),
            config.sweep_interval,
            config.idle_timeout,
        ));

        Arc::new(Self {
            registry,
            snapshots: SnapshotService::new(store),
            router,
            resolvers,
            limiter: RateLimiter::new(config.rate_capacity, config.rate_window),
        })
    }
}

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Push channel
        .route("/ws", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        // Request/response fallback surface
        .route("/sync", get(get_sync))
        .route("/sync/changes", post(post_changes))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build [`Credentials`] from request headers plus the `token` query param
pub(crate) fn credentials_from(headers: &HeaderMap, query_token: Option<&str>) -> Credentials {
    let authorization = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok());
    let cookie = headers.get("Cookie").and_then(|v| v.to_str().ok());
    Credentials::from_parts(authorization, cookie, query_token)
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Identity, Response> {
    state
        .resolvers
        .resolve(&credentials_from(headers, query_token))
        .map_err(|err| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": err.to_string() })),
            )
                .into_response()
        })
}

/// Query parameters accepted by the fallback endpoints
#[derive(Debug, Deserialize)]
pub struct SyncParams {
    pub token: Option<String>,
}

/// Snapshot wrapped for the fallback surface
#[derive(Debug, Serialize)]
struct SyncBody {
    success: bool,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    snapshot: Snapshot,
}

/// GET /sync - full snapshot over plain request/response
async fn get_sync(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
    headers: HeaderMap,
) -> Response {
    let identity = match authenticate(&state, &headers, params.token.as_deref()) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    match state
        .snapshots
        .compute(&identity.user_id, identity.role)
        .await
    {
        Ok(snapshot) => Json(SyncBody {
            success: true,
            timestamp: Utc::now(),
            snapshot,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(target: "offersync::http", error = %err, "snapshot computation failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "message": "snapshot unavailable" })),
            )
                .into_response()
        }
    }
}

/// Body of POST /sync/changes
#[derive(Debug, Deserialize)]
pub struct ChangesBody {
    pub changes: Vec<EntityChange>,
}

/// POST /sync/changes - submit mutations while the push channel is down.
/// Acknowledges receipt; push delivery to other parties is best-effort.
async fn post_changes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
    headers: HeaderMap,
    Json(body): Json<ChangesBody>,
) -> Response {
    let identity = match authenticate(&state, &headers, params.token.as_deref()) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    if !state.limiter.allow(&identity.user_id) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "success": false, "message": "rate limit exceeded" })),
        )
            .into_response();
    }

    let count = body.changes.len();
    for mut change in body.changes {
        change.originating_user_id = identity.user_id.clone();
        state.router.enqueue(change);
    }

    Json(json!({
        "success": true,
        "message": format!("accepted {} changes", count),
    }))
    .into_response()
}
