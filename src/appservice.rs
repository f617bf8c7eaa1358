//! Application-service HTTP listener.
//!
//! The homeserver pushes event transactions and asks about aliases and
//! users it does not know; every request carries the `hs_token`. Also
//! serves `/metrics` for Prometheus scraping.
//!
//! A transaction is acknowledged as soon as its events are queued on their
//! room's lane, so bridging never holds up the homeserver.

use crate::bridge::{Bridge, RoomLanes};
use crate::matrix::RawEvent;
use crate::metrics;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Path prefix of the versioned application-service API.
const API_PREFIX: &str = "/_matrix/app/v1";

/// Transaction ids remembered for duplicate detection.
const SEEN_TXN_LIMIT: usize = 1024;

#[derive(Clone)]
struct AppState {
    bridge: Arc<Bridge>,
    hs_token: Arc<str>,
    lanes: Arc<RoomLanes>,
    seen_txns: Arc<Mutex<TxnLog>>,
}

/// The most recent transaction ids, oldest evicted first.
#[derive(Debug)]
struct TxnLog {
    order: VecDeque<String>,
    ids: HashSet<String>,
    limit: usize,
}

impl TxnLog {
    fn new(limit: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(limit),
            ids: HashSet::with_capacity(limit),
            limit,
        }
    }

    /// Record `txn_id`. `false` if it is already in the log.
    fn insert(&mut self, txn_id: &str) -> bool {
        if self.ids.contains(txn_id) {
            return false;
        }
        if self.order.len() >= self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(txn_id.to_string());
        self.ids.insert(txn_id.to_string());
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    #[serde(default)]
    events: Vec<Value>,
}

/// Matrix-style error reply.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    errcode: &'static str,
    error: String,
}

impl ApiError {
    fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            errcode: "M_FORBIDDEN",
            error: "Bad token supplied".into(),
        }
    }

    fn not_found(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            errcode: "M_NOT_FOUND",
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "errcode": self.errcode, "error": self.error }));
        (self.status, body).into_response()
    }
}

/// Build the listener's routes, both at the root and under `/_matrix/app/v1`.
pub fn router(bridge: Arc<Bridge>) -> Router {
    let state = AppState {
        hs_token: Arc::from(bridge.config.appservice.hs_token.as_str()),
        lanes: Arc::new(RoomLanes::new(Arc::clone(&bridge))),
        bridge,
        seen_txns: Arc::new(Mutex::new(TxnLog::new(SEEN_TXN_LIMIT))),
    };

    let api = Router::new()
        .route("/transactions/:txn_id", put(on_transaction))
        .route("/rooms/:alias", get(on_room_query))
        .route("/users/:user_id", get(on_user_query));

    Router::new()
        .merge(api.clone())
        .nest(API_PREFIX, api)
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the application-service API until the listener fails.
pub async fn run_appservice(bridge: Arc<Bridge>) -> std::io::Result<()> {
    let addr = format!(
        "{}:{}",
        bridge.config.appservice.bind, bridge.config.appservice.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Application service listening");
    axum::serve(listener, router(bridge)).await
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

/// Accept `?access_token=` or an `Authorization: Bearer` header.
fn authorize(state: &AppState, headers: &HeaderMap, query: &AuthQuery) -> Result<(), ApiError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let token = query.access_token.as_deref().or(bearer);
    if token == Some(&*state.hs_token) {
        Ok(())
    } else {
        warn!("Rejected request with a bad hs_token");
        Err(ApiError::forbidden())
    }
}

async fn on_transaction(
    State(state): State<AppState>,
    Path(txn_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
    Json(txn): Json<Transaction>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, &auth)?;

    if !state.seen_txns.lock().insert(&txn_id) {
        debug!(txn_id = %txn_id, "Duplicate transaction acknowledged");
        return Ok(Json(json!({})));
    }

    debug!(txn_id = %txn_id, events = txn.events.len(), "Transaction received");
    for value in txn.events {
        match serde_json::from_value::<RawEvent>(value) {
            Ok(event) => state.lanes.push(event),
            Err(e) => {
                metrics::record_error("malformed_event");
                warn!(txn_id = %txn_id, error = %e, "Skipping malformed event");
            }
        }
    }
    Ok(Json(json!({})))
}

async fn on_room_query(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, &auth)?;
    match state.bridge.alias_query(&alias).await {
        Ok(room_id) => {
            debug!(alias = %alias, room_id = %room_id, "Alias query answered");
            Ok(Json(json!({})))
        }
        Err(e) => {
            metrics::record_error(e.error_code());
            warn!(alias = %alias, error = %e, "Alias query failed");
            Err(ApiError::not_found(format!("no room for {alias}")))
        }
    }
}

async fn on_user_query(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers, &auth)?;
    match state.bridge.user_query(&user_id).await {
        Ok(()) => Ok(Json(json!({}))),
        Err(e) => {
            metrics::record_error(e.error_code());
            warn!(user_id = %user_id, error = %e, "User query failed");
            Err(ApiError::not_found(format!("no IRC user for {user_id}")))
        }
    }
}
