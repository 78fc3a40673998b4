// src/api.rs
//! Admin HTTP surface over the command layer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::alerts::AlertVariant;
use crate::commands::{
    self, AlertListing, AppListing, CommandError, NewAlert, PackageReviews,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/users/{user}/apps", get(list_apps).post(add_app))
        .route("/users/{user}/aliases", post(add_alias))
        .route("/users/{user}/alerts", get(list_alerts).post(add_alert))
        .route("/users/{user}/alerts/{name}", delete(remove_alert))
        .route("/users/{user}/reviews", get(latest_reviews))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        let status = match &self {
            CommandError::Empty(_) | CommandError::BadFrequency(_) => StatusCode::BAD_REQUEST,
            CommandError::UnknownPackage(_) | CommandError::UnknownAlert(_) => StatusCode::NOT_FOUND,
            CommandError::PackageExists(_)
            | CommandError::AliasExists { .. }
            | CommandError::AlertExists(_) => StatusCode::CONFLICT,
            CommandError::SourceRejected { .. } => StatusCode::BAD_GATEWAY,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct AddAppReq {
    package: String,
}

async fn add_app(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<AddAppReq>,
) -> Result<StatusCode, CommandError> {
    commands::add_app(&state, &user, body.package.trim()).await?;
    Ok(StatusCode::CREATED)
}

async fn list_apps(State(state): State<AppState>, Path(user): Path<String>) -> Json<Vec<AppListing>> {
    Json(commands::list_apps(&state, &user))
}

#[derive(Deserialize)]
struct AddAliasReq {
    alias: String,
    package: String,
}

async fn add_alias(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<AddAliasReq>,
) -> Result<StatusCode, CommandError> {
    commands::add_alias(&state, &user, body.alias.trim(), body.package.trim()).await?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
struct AddAlertReq {
    name: String,
    kind: AlertVariant,
    webhook: String,
    /// package name or alias
    target: String,
    frequency_secs: i64,
}

async fn add_alert(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<AddAlertReq>,
) -> Result<(StatusCode, Json<serde_json::Value>), CommandError> {
    let package = commands::add_alert(
        &state,
        &user,
        NewAlert {
            name: body.name.trim(),
            variant: body.kind,
            webhook: body.webhook.trim(),
            target: body.target.trim(),
            frequency_secs: body.frequency_secs,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "name": body.name.trim(), "package": package })),
    ))
}

async fn remove_alert(
    State(state): State<AppState>,
    Path((user, name)): Path<(String, String)>,
) -> Result<StatusCode, CommandError> {
    commands::remove_alert(&state, &user, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_alerts(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<Vec<AlertListing>> {
    Json(commands::list_alerts(&state, &user))
}

async fn latest_reviews(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<Vec<PackageReviews>> {
    Json(commands::latest_reviews(&state, &user))
}
