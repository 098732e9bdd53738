use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::orchestrator::{PullRequestEvent, Trigger};
use crate::AppState;
use approver_core::CommitSha;

/// Shared shape of `pull_request` and `pull_request_review` payloads, limited
/// to the fields the approver reads.
#[derive(Debug, Deserialize)]
pub struct GitHubWebhookPayload {
    pub action: String,
    pub pull_request: PullRequest,
    pub repository: Repository,
    pub installation: Option<Installation>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub head: PullRequestRef,
    pub user: User,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestRef {
    pub sha: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub login: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

impl GitHubWebhookPayload {
    /// Map the payload to an engine event if `trigger` applies.
    pub fn into_event(self, trigger: Trigger) -> PullRequestEvent {
        PullRequestEvent {
            installation_id: self.installation.map(|i| i.id),
            repo_owner: self.repository.owner.login,
            repo_name: self.repository.name,
            pr_number: self.pull_request.number,
            head_sha: CommitSha::from(self.pull_request.head.sha),
            author: self.pull_request.user.login,
            labels: self
                .pull_request
                .labels
                .into_iter()
                .map(|label| label.name)
                .collect(),
            trigger,
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

/// GitHub caps webhook payloads at 25 MB.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 25 * 1024 * 1024;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook without signature header");
            StatusCode::UNAUTHORIZED
        })?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(request).await)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

fn respond(message: impl Into<String>) -> Json<WebhookResponse> {
    Json(WebhookResponse {
        message: message.into(),
    })
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let delivery = header_value(&headers, "x-github-delivery")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let event_type = header_value(&headers, "x-github-event").unwrap_or_default();

    info!("Received {} webhook (delivery {})", event_type, delivery);

    let action_to_trigger: fn(&str) -> Option<Trigger> = match event_type {
        "pull_request" => Trigger::from_pull_request_action,
        "pull_request_review" => Trigger::from_review_action,
        _ => return Ok(respond(format!("Ignored {} event", event_type))),
    };

    let payload: GitHubWebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!("Failed to decode {} payload: {}", event_type, e);
        StatusCode::BAD_REQUEST
    })?;

    let Some(trigger) = action_to_trigger(&payload.action) else {
        return Ok(respond(format!(
            "Ignored {} action {}",
            event_type, payload.action
        )));
    };

    let event = payload.into_event(trigger);
    let span = info_span!(
        "attempt",
        delivery = %delivery,
        repo = %format!("{}/{}", event.repo_owner, event.repo_name),
        pr = event.pr_number,
        sha = %event.head_sha.short(),
    );

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(
        async move {
            let outcome = orchestrator.handle(event).await;
            info!("Attempt finished: {:?}", outcome);
        }
        .instrument(span),
    );

    Ok(respond(format!("Processing {:?}", trigger)))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
