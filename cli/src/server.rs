use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::zone::ViewerZone;
use bodytrend_core::models::{
    ChartRange, ChartResponse, GoalProgress, MetricKind, ValueKind, parse_timestamp,
};
use bodytrend_core::progress::{ProgressBand, goal_progress};
use bodytrend_core::refresh::{DerivedState, DisplayContext, RequestTracker};
use bodytrend_core::service::TrendService;
use bodytrend_core::trend::{per_week_unit, unit_suffix};
use bodytrend_core::units::WeightUnit;

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<TrendService>>,
    tracker: Arc<Mutex<RequestTracker>>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct DeriveChartRequest {
    metric: String,
    unit: Option<String>,
    tz: Option<String>,
    range: Option<String>,
    /// Reference instant for the year-to-date cutoff; defaults to now.
    now: Option<String>,
    #[serde(default)]
    response: ChartResponse,
}

#[derive(Deserialize)]
struct DeriveProgressRequest {
    first_value: f64,
    latest_value: f64,
    target_value: f64,
    on_track: Option<bool>,
}

#[derive(Serialize)]
struct ProgressResponse {
    #[serde(flatten)]
    progress: GoalProgress,
    band: ProgressBand,
}

#[derive(Serialize, Deserialize)]
struct UnitPreference {
    weight_unit: String,
}

#[derive(Serialize)]
struct MetricInfo {
    key: &'static str,
    label: &'static str,
    value_kind: ValueKind,
    unit: &'static str,
    per_week_unit: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(err.to_string())
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn list_metrics(State(state): State<AppState>) -> Result<Json<Vec<MetricInfo>>, ApiError> {
    let unit = stored_unit(&state)?;
    let metrics = MetricKind::ALL
        .into_iter()
        .map(|m| MetricInfo {
            key: m.key(),
            label: m.label(),
            value_kind: m.value_kind(),
            unit: unit_suffix(m, unit),
            per_week_unit: per_week_unit(m, unit),
        })
        .collect();
    Ok(Json(metrics))
}

async fn derive_chart(
    State(state): State<AppState>,
    Json(req): Json<DeriveChartRequest>,
) -> Result<Json<DerivedState>, ApiError> {
    let metric: MetricKind = req.metric.parse().map_err(bad_request)?;
    let unit: WeightUnit = match req.unit.as_deref() {
        Some(raw) => raw.parse().map_err(bad_request)?,
        None => stored_unit(&state)?,
    };
    let range: ChartRange = match req.range.as_deref() {
        Some(raw) => raw.parse().map_err(bad_request)?,
        None => ChartRange::Max,
    };
    let zone: ViewerZone = match req.tz.as_deref() {
        Some(raw) => raw.parse().map_err(bad_request)?,
        None => ViewerZone::Named(chrono_tz::UTC),
    };
    let now = match req.now.as_deref() {
        Some(raw) => parse_timestamp(raw).map_err(bad_request)?,
        None => Utc::now(),
    };

    let generation = state
        .tracker
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .begin();
    let ctx = DisplayContext {
        metric,
        unit,
        range,
        now,
    };
    let derived = zone
        .derive(generation, &req.response, &ctx)
        .map_err(bad_request)?;
    tracing::debug!(
        generation = generation.value(),
        %metric,
        points = derived.series.len(),
        "derived chart"
    );
    Ok(Json(derived))
}

async fn derive_progress(Json(req): Json<DeriveProgressRequest>) -> Json<ProgressResponse> {
    let progress = goal_progress(
        req.first_value,
        req.latest_value,
        req.target_value,
        req.on_track,
    );
    Json(ProgressResponse {
        band: ProgressBand::from_pct(progress.progress_pct),
        progress,
    })
}

async fn get_unit(State(state): State<AppState>) -> Result<Json<UnitPreference>, ApiError> {
    let unit = stored_unit(&state)?;
    Ok(Json(UnitPreference {
        weight_unit: unit.to_string(),
    }))
}

async fn put_unit(
    State(state): State<AppState>,
    Json(req): Json<UnitPreference>,
) -> Result<Json<UnitPreference>, ApiError> {
    let unit: WeightUnit = req.weight_unit.parse().map_err(bad_request)?;
    let service = state
        .service
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    service
        .set_weight_unit(unit)
        .context("failed to store weight unit")?;
    Ok(Json(UnitPreference {
        weight_unit: unit.to_string(),
    }))
}

fn stored_unit(state: &AppState) -> Result<WeightUnit, ApiError> {
    let service = state
        .service
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Ok(service.weight_unit().context("failed to read weight unit")?)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/metrics", get(list_metrics))
        .route("/api/derive/chart", post(derive_chart))
        .route("/api/derive/progress", post(derive_progress))
        .route("/api/preferences/unit", get(get_unit).put(put_unit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key, or a mask when it is too short
/// to abbreviate.
fn key_hint(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: TrendService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        tracker: Arc::new(Mutex::new(RequestTracker::new())),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_hint(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(api_key: Option<String>) -> AppState {
        AppState {
            service: Arc::new(Mutex::new(TrendService::new_in_memory().unwrap())),
            tracker: Arc::new(Mutex::new(RequestTracker::new())),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, json: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn weight_chart_body() -> serde_json::Value {
        serde_json::json!({
            "metric": "weight",
            "unit": "kg",
            "tz": "America/New_York",
            "response": {
                "points": [
                    { "taken_at": "2024-06-15T02:00:00Z", "value": 180.0 },
                    { "taken_at": "2024-06-15T20:00:00Z", "value": 181.0 },
                    { "taken_at": "2024-06-16T12:00:00Z", "value": null }
                ],
                "trend": -1.0
            }
        })
    }

    #[test]
    fn key_hint_handles_short_and_multibyte_keys() {
        assert_eq!(key_hint("0123456789abcdef"), "0123...cdef");
        assert_eq!(key_hint("abc"), "****");
        assert_eq!(key_hint(""), "****");
        assert_eq!(key_hint("ééééxyzwvvvv"), "éééé...vvvv");
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/preferences/unit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/preferences/unit")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/preferences/unit")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["weight_unit"], "lbs");
    }

    #[tokio::test]
    async fn no_auth_mode_allows_requests() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 6);
        assert_eq!(json[0]["key"], "weight");
        assert_eq!(json[0]["per_week_unit"], "lbs/week");
        assert_eq!(json[2]["value_kind"], "percent");
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/preferences/unit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/preferences/unit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/derive/chart")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!(
            "secret database path /home/user/.bodytrend/db"
        ));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn derive_chart_buckets_and_converts() {
        let app = test_app(None);

        let response = app
            .oneshot(post_json("/api/derive/chart", &weight_chart_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let series = json["series"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0]["day"], "2024-06-14");
        assert_eq!(series[0]["value"], 81.6);
        assert_eq!(series[1]["day"], "2024-06-15");
        assert_eq!(series[1]["value"], 82.1);
        assert_eq!(json["labels"][0], "Jun 14");
        assert_eq!(json["unit"], "kg");
        assert_eq!(json["per_week_unit"], "kg/week");
        assert_eq!(json["trend_label"], "▼ 0.5");
        assert!(json.get("canonical").is_none());
    }

    #[tokio::test]
    async fn derive_chart_generations_increase() {
        let state = test_state(None);

        let first = build_router(state.clone())
            .oneshot(post_json("/api/derive/chart", &weight_chart_body()))
            .await
            .unwrap();
        let second = build_router(state)
            .oneshot(post_json("/api/derive/chart", &weight_chart_body()))
            .await
            .unwrap();

        let a = body_json(first).await["generation"].as_u64().unwrap();
        let b = body_json(second).await["generation"].as_u64().unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn derive_chart_uses_stored_unit_by_default() {
        let state = test_state(None);
        state
            .service
            .lock()
            .unwrap()
            .set_weight_unit(WeightUnit::Kg)
            .unwrap();

        let mut body = weight_chart_body();
        body.as_object_mut().unwrap().remove("unit");
        let response = build_router(state)
            .oneshot(post_json("/api/derive/chart", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["unit"], "kg");
    }

    #[tokio::test]
    async fn derive_chart_ytd_uses_supplied_now() {
        let app = test_app(None);
        let body = serde_json::json!({
            "metric": "fat_percent",
            "range": "ytd",
            "now": "2024-03-01T00:00:00Z",
            "response": {
                "points": [
                    { "taken_at": "2023-12-30T08:00:00Z", "value": 23.0 },
                    { "taken_at": "2024-01-05T08:00:00Z", "value": 22.5 }
                ],
                "trend": 0.5
            }
        });

        let response = app
            .oneshot(post_json("/api/derive/chart", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["series"].as_array().unwrap().len(), 1);
        assert_eq!(json["latest"], "22.5%");
        assert_eq!(json["trend_label"], "▲ 0.5%");
    }

    #[tokio::test]
    async fn derive_chart_bad_timestamp_returns_400() {
        let app = test_app(None);
        let body = serde_json::json!({
            "metric": "weight",
            "response": { "points": [{ "taken_at": "yesterday", "value": 180.0 }] }
        });

        let response = app
            .oneshot(post_json("/api/derive/chart", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("yesterday"));
    }

    #[tokio::test]
    async fn derive_chart_unknown_metric_returns_400() {
        let app = test_app(None);
        let body = serde_json::json!({ "metric": "height", "response": {} });

        let response = app
            .oneshot(post_json("/api/derive/chart", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn derive_chart_unknown_zone_returns_400() {
        let app = test_app(None);
        let mut body = weight_chart_body();
        body["tz"] = serde_json::json!("Mars/Olympus");

        let response = app
            .oneshot(post_json("/api/derive/chart", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn derive_progress_returns_band() {
        let app = test_app(None);
        let body = serde_json::json!({
            "first_value": 200.0,
            "latest_value": 185.0,
            "target_value": 180.0,
            "on_track": true
        });

        let response = app
            .oneshot(post_json("/api/derive/progress", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["progress_pct"], 75.0);
        assert_eq!(json["on_track"], true);
        assert_eq!(json["band"], "approaching");
    }

    #[tokio::test]
    async fn derive_progress_baseline_at_target() {
        let app = test_app(None);
        let body = serde_json::json!({
            "first_value": 25.0,
            "latest_value": 27.0,
            "target_value": 25.0
        });

        let response = app
            .oneshot(post_json("/api/derive/progress", &body))
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["progress_pct"], 100.0);
        assert_eq!(json["on_track"], true);
        assert_eq!(json["band"], "ahead");
    }

    #[tokio::test]
    async fn put_unit_then_get() {
        let state = test_state(None);

        let put = build_router(state.clone())
            .oneshot(
                axum::http::Request::put("/api/preferences/unit")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"weight_unit":"KG"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);
        assert_eq!(body_json(put).await["weight_unit"], "kg");

        let get = build_router(state)
            .oneshot(
                axum::http::Request::get("/api/preferences/unit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(get).await["weight_unit"], "kg");
    }

    #[tokio::test]
    async fn put_unit_invalid_returns_400() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::put("/api/preferences/unit")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"weight_unit":"stone"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
