use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, MessageResponse, PublicStudent, RegisterRequest, ResetPasswordRequest},
        extractors::AdminAuth,
        services::{self, Registration},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/reset-password", post(reset_password))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<PublicStudent>, (StatusCode, String)> {
    let outcome = services::login(&state, &payload.legajo, &payload.password).await?;
    // A pending upgrade keeps running detached; the response does not wait for it.
    drop(outcome.upgrade);
    Ok(Json(outcome.student))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicStudent>), (StatusCode, String)> {
    let reg = services::register(&state, &payload.legajo, &payload.password, payload.nombre).await?;
    Ok(match reg {
        Registration::Created(s) => (StatusCode::CREATED, Json(s)),
        Registration::Activated(s) => (StatusCode::OK, Json(s)),
    })
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let student = services::reset_password(&state, &payload.legajo, &payload.password).await?;
    Ok(Json(MessageResponse {
        message: format!("Contraseña restablecida para el legajo {}", student.legajo),
    }))
}
