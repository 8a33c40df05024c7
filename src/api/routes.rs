use crate::api::api_error::APIError;
use crate::api::model::{ChallengeRequest, ChallengeResult, TimeoutResult};
use crate::api::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/timeout", get(timeout))
        .route("/present", post(present))
        .route("/cleanup", post(clean_up))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let failed = state.provider.failed_transports().await;
    if failed.is_empty() {
        return (StatusCode::OK, Json(json!({"ok":"healthy"})));
    }
    let failed: Vec<String> = failed.iter().map(ToString::to_string).collect();
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "DNS listener failed", "transports": failed})),
    )
}

#[allow(clippy::unused_async)]
async fn timeout(State(state): State<AppState>) -> Json<TimeoutResult> {
    Json(state.provider.timeout().into())
}

async fn present(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ChallengeRequest>, APIError>,
) -> Result<Json<ChallengeResult>, APIError> {
    if let Err(err) = payload.validate() {
        tracing::debug!("rejected present for \"{}\": {err}", payload.domain);
        return Err(err.into());
    }
    let record = state
        .provider
        .present(&payload.domain, &payload.token, &payload.key_auth)
        .await?;
    tracing::info!("presented challenge for \"{}\"", payload.domain);
    Ok(Json(record.into()))
}

async fn clean_up(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ChallengeRequest>, APIError>,
) -> Result<Json<ChallengeResult>, APIError> {
    if let Err(err) = payload.validate() {
        tracing::debug!("rejected cleanup for \"{}\": {err}", payload.domain);
        return Err(err.into());
    }
    let record = state
        .provider
        .clean_up(&payload.domain, &payload.token, &payload.key_auth)
        .await?;
    tracing::info!("cleaned up challenge for \"{}\"", payload.domain);
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::SelfDnsProvider;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::Value;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> (AppState, Arc<SelfDnsProvider>) {
        let config = Arc::new(Config {
            listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            dns_port: 0,
            server_hostname: Some("ns1.example.com".to_string()),
            ..Config::default()
        });
        let provider = Arc::new(SelfDnsProvider::new(config.clone()));
        (
            AppState {
                config,
                provider: provider.clone(),
            },
            provider,
        )
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_ok() {
        let (state, _) = state();
        let response = new(state)
            .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"ok":"healthy"}));
    }

    #[tokio::test]
    async fn timeout_reports_policy() {
        let (state, _) = state();
        let response = new(state)
            .oneshot(Request::get("/timeout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"timeout": 120, "interval": 2})
        );
    }

    #[tokio::test]
    async fn present_then_cleanup() {
        let (state, provider) = state();
        let body = r#"{"domain":"example.com","token":"tok","key_auth":"tok.thumb"}"#;

        let response = new(state.clone())
            .oneshot(post_json("/present", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let presented = body_json(response).await;
        assert_eq!(presented["fqdn"], "_acme-challenge.example.com.");
        assert!(provider.is_running().await);

        let response = new(state)
            .oneshot(post_json("/cleanup", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, presented);
        assert!(!provider.is_running().await);
    }

    #[tokio::test]
    async fn present_rejects_mismatched_key_auth() {
        let (state, provider) = state();
        let response = new(state)
            .oneshot(post_json(
                "/present",
                r#"{"domain":"example.com","token":"tok","key_auth":"other.thumb"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!provider.is_running().await);
    }

    #[tokio::test]
    async fn present_rejects_bad_json() {
        let (state, _) = state();
        let response = new(state.clone())
            .oneshot(post_json("/present", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = new(state)
            .oneshot(post_json("/present", r#"{"domain":"example.com"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn present_requires_json_content_type() {
        let (state, provider) = state();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/present")
            .body(Body::from(
                r#"{"domain":"example.com","token":"tok","key_auth":"tok.thumb"}"#,
            ))
            .unwrap();
        let response = new(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body_json(response).await["error"].is_string());
        assert!(!provider.is_running().await);
    }
}
