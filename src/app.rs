use std::{net::SocketAddr, time::Duration};

use axum::{
    body::Body,
    http::{Request, Response},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Span;

use crate::auth;
use crate::state::AppState;

fn request_span(req: &Request<Body>) -> Span {
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri(),
        status = tracing::field::Empty,
    )
}

fn log_response<B>(res: &Response<B>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", tracing::field::display(status));
    if status.is_server_error() {
        tracing::error!(%status, ?latency, "response");
    } else {
        tracing::info!(%status, ?latency, "response");
    }
}

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .route("/health", get(|| async { "ok" }));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(log_response),
        )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::password::{legacy_hash, PasswordHasher};
    use crate::config::AppConfig;
    use crate::auth::repo_types::{CredentialRecord, PasswordCredential};
    use crate::store::MemoryStore;

    const GENERIC_401: &str = "Legajo o contraseña incorrectos";

    fn app() -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), build_app(AppState::fake(store)))
    }

    async fn post(app: &Router, uri: &str, body: Value, bearer: Option<&str>) -> (StatusCode, String) {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let res = app
            .clone()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_, app) = app();
        let res = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_and_login_round_trip() {
        let (_, app) = app();
        let (status, body) = post(
            &app,
            "/api/register",
            json!({ "legajo": "4521", "password": "abc123", "nombre": "Ana" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.contains("\"legajo\":\"4521\""));

        let (status, body) = post(
            &app,
            "/api/login",
            json!({ "legajo": "4521", "password": "abc123" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["nombre"], "Ana");
        assert!(!body.contains("salt"));
    }

    #[tokio::test]
    async fn login_failures_share_one_message() {
        let (store, app) = app();
        store
            .insert(CredentialRecord {
                id: "rec1".into(),
                legajo: "1000".into(),
                nombre: None,
                credential: None,
            })
            .await;
        post(
            &app,
            "/api/register",
            json!({ "legajo": "2000", "password": "abc123" }),
            None,
        )
        .await;

        for (legajo, password) in [("1000", "x"), ("2000", "wrong"), ("3000", "x")] {
            let (status, body) = post(
                &app,
                "/api/login",
                json!({ "legajo": legajo, "password": password }),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, GENERIC_401);
        }
    }

    #[tokio::test]
    async fn missing_fields_are_bad_request() {
        let (_, app) = app();
        let (status, _) = post(&app, "/api/login", json!({ "legajo": "4521" }), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = post(&app, "/api/register", json!({}), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (_, app) = app();
        let body = json!({ "legajo": "4521", "password": "abc123" });
        assert_eq!(post(&app, "/api/register", body.clone(), None).await.0, StatusCode::CREATED);
        assert_eq!(post(&app, "/api/register", body, None).await.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn legacy_login_succeeds_over_http() {
        let (store, app) = app();
        store
            .insert(CredentialRecord {
                id: "rec1".into(),
                legajo: "4521".into(),
                nombre: None,
                credential: Some(PasswordCredential {
                    salt: "aa11".into(),
                    hash: legacy_hash("secret", "aa11"),
                }),
            })
            .await;
        let (status, _) = post(
            &app,
            "/api/login",
            json!({ "legajo": "4521", "password": "secret" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reset_requires_admin_token() {
        let (_, app) = app();
        post(
            &app,
            "/api/register",
            json!({ "legajo": "4521", "password": "abc123" }),
            None,
        )
        .await;
        let body = json!({ "legajo": "4521", "password": "nueva" });

        assert_eq!(
            post(&app, "/api/reset-password", body.clone(), None).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            post(&app, "/api/reset-password", body.clone(), Some("nope")).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            post(&app, "/api/reset-password", body, Some("admin-secret")).await.0,
            StatusCode::OK
        );

        let (status, _) = post(
            &app,
            "/api/login",
            json!({ "legajo": "4521", "password": "nueva" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reset_is_forbidden_without_configured_token() {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(AppConfig {
            admin_token: None,
            ..AppConfig::for_tests()
        });
        let app = build_app(AppState::from_parts(config, store, PasswordHasher::default()));

        let (status, _) = post(
            &app,
            "/api/reset-password",
            json!({ "legajo": "4521", "password": "nueva" }),
            Some("admin-secret"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
