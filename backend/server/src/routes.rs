use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use crate::{
    admin::{self, RecordKey, Stats},
    database::OrderRecord,
    error::AppError,
    intake::{ContactReceipt, OrderReceipt, submit_contact, submit_order},
    state::AppState,
    utils::{client_key, origin_allowed},
    validation::{ContactPayload, MALFORMED, OrderPayload},
};

pub const ADMIN_ORDERS_PATH: &str = "/admin/orders";

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn order_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<OrderReceipt>, AppError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "Malformed order payload");
        AppError::Validation(MALFORMED)
    })?;

    let receipt = submit_order(&state, payload, &client_key(&headers)).await?;

    Ok(Json(receipt))
}

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ContactPayload>, JsonRejection>,
) -> Result<Json<ContactReceipt>, AppError> {
    if !origin_allowed(&headers, &state.config.allowed_origins) {
        warn!("Contact origin rejected");
        return Err(AppError::OriginRejected);
    }

    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "Malformed contact payload");
        AppError::Validation(MALFORMED)
    })?;

    let receipt = submit_contact(&state, payload, &client_key(&headers)).await?;

    Ok(Json(receipt))
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.config.admin_token.as_deref().ok_or(AppError::NotFound)?;

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided != Some(expected) {
        warn!("Admin request without valid token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderRecord>>, AppError> {
    Ok(Json(state.store.list().await?))
}

pub async fn export_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let records = state.store.list().await?;

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"orders.csv\""),
        ],
        admin::export_csv(&records),
    )
        .into_response())
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Json<Stats>, AppError> {
    Ok(Json(admin::stats(state.store.as_ref()).await?))
}

pub async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Redirect, AppError> {
    admin::toggle_emailed(state.store.as_ref(), &RecordKey::parse(&key)).await?;

    Ok(Redirect::to(ADMIN_ORDERS_PATH))
}

pub async fn resend_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Redirect, AppError> {
    admin::resend(state.store.as_ref(), &state.dispatcher, &RecordKey::parse(&key)).await?;

    Ok(Redirect::to(ADMIN_ORDERS_PATH))
}
