//! Demo routes and the logger configuration they run under.

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use reqtrail_middleware::{
    ANONYMOUS_USER, CidrGeoTable, GeoRecord, LoggerConfig, LoggerSettings, Origin,
    RequestLoggerLayer,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

/// Settings used when nothing is configured through the environment.
pub fn demo_settings(log_file: PathBuf) -> LoggerSettings {
    let mut settings = LoggerSettings::new(log_file);
    settings.mask_fields.push("authorization".into());
    settings.track_query = true;
    settings.log_headers = true;
    settings.log_params = true;
    settings.log_response_body = true;
    settings.track_origin = true;
    settings.enable_geoip = true;
    settings.track_slow = true;
    settings.exclude_paths = vec!["/health".into()];
    settings
}

pub fn logger_config(settings: LoggerSettings) -> LoggerConfig {
    // RFC 5737 documentation ranges, so the demo has something to resolve.
    let geo = CidrGeoTable::new()
        .with_range("192.0.2.0/24", GeoRecord::new("Testland", "TEST-NET-1", "Alpha"))
        .with_range("198.51.100.0/24", GeoRecord::new("Testland", "TEST-NET-2", "Beta"))
        .with_range("203.0.113.0/24", GeoRecord::new("Testland", "TEST-NET-3", "Gamma"));

    LoggerConfig::from_settings(settings)
        .geo_lookup(geo)
        .track_user(|parts| {
            parts
                .headers
                .get("x-user")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .unwrap_or(ANONYMOUS_USER)
                .to_string()
        })
}

/// Installed with `route_layer` so route params are visible to the logger.
pub fn router(layer: RequestLoggerLayer) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/users/{id}", get(get_user))
        .route("/health", get(health))
        .route("/boom", get(boom))
        .route_layer(layer)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    #[allow(dead_code)]
    password: String,
}

async fn login(Json(req): Json<LoginRequest>) -> impl IntoResponse {
    (
        Extension(Origin::at("login")),
        Json(json!({ "user": req.username, "status": "signed-in" })),
    )
}

async fn get_user(Path(id): Path<u64>) -> impl IntoResponse {
    (
        Extension(Origin::at("get_user")),
        Json(json!({ "id": id, "name": format!("user-{id}") })),
    )
}

async fn health() -> &'static str {
    "ok"
}

async fn boom() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "something went wrong")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: Router, request: Request) -> StatusCode {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        status
    }

    fn entries(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn demo_routes_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.log");
        let layer = RequestLoggerLayer::new(logger_config(demo_settings(path.clone())));
        let app = router(layer.clone());

        let login = Request::builder()
            .method("POST")
            .uri("/login")
            .header("content-type", "application/json")
            .header("x-user", "alice")
            .body(Body::from(r#"{"username":"alice","password":"hunter2"}"#))
            .unwrap();
        assert_eq!(call(app.clone(), login).await, StatusCode::OK);

        let user = Request::builder().uri("/users/7?verbose=1").body(Body::empty()).unwrap();
        assert_eq!(call(app.clone(), user).await, StatusCode::OK);

        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(call(app.clone(), health).await, StatusCode::OK);

        let boom = Request::builder().uri("/boom").body(Body::empty()).unwrap();
        assert_eq!(call(app, boom).await, StatusCode::INTERNAL_SERVER_ERROR);

        layer.flush().await;
        let entries = entries(&path);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0]["user"], "alice");
        assert_eq!(entries[0]["body"]["password"], "****");
        assert_eq!(entries[0]["origin"]["func"], "login");
        assert_eq!(entries[0]["origin"]["file"], "app.rs");

        assert_eq!(entries[1]["params"]["id"], "7");
        assert_eq!(entries[1]["query"]["verbose"], "1");
        assert_eq!(entries[1]["user"], "anonymous");

        assert_eq!(entries[2]["status"], 500);
        assert_eq!(entries[2]["responseSnippet"], "something went wrong");
    }
}
