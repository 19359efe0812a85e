use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::state::AppState;

/// Token from an `Authorization: Bearer …` header; the scheme is case-insensitive.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Guards administrator-only endpoints with the `ADMIN_API_TOKEN` bearer token.
#[derive(Debug)]
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            warn!("admin endpoint called but ADMIN_API_TOKEN is not configured");
            return Err((StatusCode::FORBIDDEN, "admin API disabled".into()));
        };

        let token = bearer_token(parts)
            .ok_or((StatusCode::UNAUTHORIZED, "missing bearer token".into()))?;

        if !bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
            warn!("admin token rejected");
            return Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()));
        }

        Ok(AdminAuth)
    }
}
