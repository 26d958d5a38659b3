use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::REFERER;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde::Deserialize;

use super::AppState;
use super::error::Result;
use crate::context::RequestContext;
use crate::models::Record;

const INDEX_PAGE: &str = include_str!("../../templates/index.html");

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    #[serde(default)]
    pub name: String,
}

/// Sends the caller back where it came from, otherwise renders the page.
pub async fn index(headers: HeaderMap) -> Response {
    match headers.get(REFERER).and_then(|value| value.to_str().ok()) {
        Some(referer) if !referer.is_empty() => Redirect::to(referer).into_response(),
        _ => Html(INDEX_PAGE).into_response(),
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// `202 Accepted`: the record is published, not yet committed.
pub async fn create_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: std::result::Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>)> {
    let Json(payload) = payload?;
    let record = state.business.store(&ctx, &payload.name).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn get_record(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<Record>> {
    let record = state.business.get(&ctx, &id).await?;
    Ok(Json(record))
}
