//! Bridge webhook HTTP handlers
//!
//! The WeChat bridge POSTs every message event it sees. Events are
//! classified here and queued for the recall worker.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bridge_api::TOKEN_HEADER;
use crate::classifier::EventClassifier;
use crate::session::SessionContext;
use crate::storage::ContentStore;
use crate::types::{BridgeEvent, ContentKind, InboundEvent};

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub classifier: EventClassifier,
    pub session: Arc<SessionContext>,
    /// Read only here, for health reporting
    pub store: Arc<ContentStore>,
    pub events: mpsc::Sender<InboundEvent>,
    pub token: Option<String>,
    pub debug_mode: bool,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/bridge/events", post(handle_event))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Run the webhook HTTP server
pub async fn run_server(addr: SocketAddr, state: WebhookState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    texts: usize,
    images: usize,
    destination: Option<String>,
}

/// Health check endpoint; 503 when the store cannot be read
async fn health_check(
    State(state): State<WebhookState>,
) -> Result<Json<HealthReport>, StatusCode> {
    let count = |kind: ContentKind| {
        state.store.count(kind).map_err(|e| {
            error!("Health check failed to count {} messages: {}", kind, e);
            StatusCode::SERVICE_UNAVAILABLE
        })
    };

    Ok(Json(HealthReport {
        status: "ok",
        texts: count(ContentKind::Text)?,
        images: count(ContentKind::Image)?,
        destination: state.session.destination(),
    }))
}

/// Middleware to log all incoming HTTP requests
async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("🌐 HTTP {} {}", method, path);

    let response = next.run(req).await;

    debug!("📤 Response status: {}", response.status());

    response
}

/// Handle one message event from the bridge
///
/// Skipped events still answer `success`; the bridge must not retry them.
async fn handle_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(event): Json<BridgeEvent>,
) -> Result<&'static str, StatusCode> {
    if let Some(expected) = &state.token {
        let provided = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Rejected bridge event {}: bad token", event.msg_id);
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    if state.debug_mode {
        debug!("Raw bridge event: {:?}", event);
    }

    state.session.observe(&event);

    let classified = match state.classifier.classify(&event).await {
        Ok(InboundEvent::Other) => return Ok("success"),
        Ok(classified) => classified,
        Err(e) => {
            warn!("Skipping message {}: {}", event.msg_id, e);
            return Ok("success");
        }
    };

    if state.events.send(classified).await.is_err() {
        error!("Recall worker is gone, dropping message {}", event.msg_id);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    info!(
        "📥 Queued message {} from {} in {}",
        event.msg_id,
        event.sender(),
        state.classifier.monitored_group()
    );
    Ok("success")
}
