use crate::ports::SubscriptionStore;
use crate::push as push_service;
use crate::state;
use crate::types::push::{DispatchOutcome, PushSubscription};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn dispatch_error(err: push_service::DispatchError) -> ApiError {
    match err {
        push_service::DispatchError::Config(err) => {
            tracing::warn!(error = %err, "push notifications are not configured");
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Push notifications are not configured.",
            )
        }
        err => {
            tracing::error!(error = %err, "push dispatch failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to dispatch notification.")
        }
    }
}

fn store_error(err: crate::ports::StoreError) -> ApiError {
    tracing::error!(error = %err, "subscription store error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Subscription store unavailable.")
}

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

pub(crate) async fn push_public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let vapid = state.dispatcher.vapid_keys().await.map_err(dispatch_error)?;
    Ok(Json(PublicKeyResponse {
        public_key: vapid.public_key_base64().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionKeys {
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

/// Mirrors the browser's `PushSubscription.toJSON()` plus the owning user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscribeRequest {
    pub(crate) user_id: String,
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
}

#[derive(Serialize)]
pub(crate) struct SubscribeResponse {
    pub(crate) id: String,
}

pub(crate) async fn push_subscribe(
    State(state): State<state::AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>), ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "userId is required."));
    }

    let subscription = PushSubscription {
        endpoint: request.endpoint.trim().to_string(),
        p256dh: request.keys.p256dh.trim().to_string(),
        auth: request.keys.auth.trim().to_string(),
    };
    push_service::push_audience(&subscription.endpoint)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;
    push_service::SubscriberKeys::from_subscription(&subscription)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, err.to_string()))?;

    let stored = state
        .store
        .save_subscription(request.user_id.trim(), subscription)
        .await
        .map_err(store_error)?;
    tracing::info!(user_id = %stored.user_id, endpoint = %stored.subscription.endpoint, "push subscription saved");

    Ok((StatusCode::CREATED, Json(SubscribeResponse { id: stored.id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UnsubscribeRequest {
    pub(crate) user_id: String,
    pub(crate) endpoint: String,
}

#[derive(Serialize)]
pub(crate) struct UnsubscribeResponse {
    pub(crate) removed: bool,
}

pub(crate) async fn push_unsubscribe(
    State(state): State<state::AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let removed = state
        .store
        .delete_by_endpoint(request.user_id.trim(), request.endpoint.trim())
        .await
        .map_err(store_error)?;
    Ok(Json(UnsubscribeResponse { removed }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DispatchRequest {
    pub(crate) user_id: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) data: Option<serde_json::Value>,
}

pub(crate) async fn push_dispatch(
    State(state): State<state::AppState>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    if request.user_id.trim().is_empty() || request.title.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "userId and title are required.",
        ));
    }

    let outcome = state
        .dispatcher
        .dispatch_to_user(
            request.user_id.trim(),
            &request.title,
            &request.body,
            request.data,
        )
        .await
        .map_err(dispatch_error)?;
    Ok(Json(outcome))
}
