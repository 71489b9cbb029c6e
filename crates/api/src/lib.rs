//! Cold-Chain Monitor API Server
//!
//! REST surface over the ingestion gateway: reading ingress, the active
//! incident and its corrective actions, thresholds, archives and health.

use alerting::{EmailChannel, NotificationFanout, PushChannel, TelegramChannel};
use axum::{
    extract::State,
    routing::{get, patch, post},
    Json, Router,
};
use data_validator::Validator;
use incident_core::IngestionGateway;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sensor_bridge::SensorBridge;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use storage::{Repository, SqliteRepository, StorageError, Store};
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod extract;
pub mod rate_limit;
mod routes;

use crate::config::{LoggingSettings, NotificationSettings, Settings};
use crate::rate_limit::{create_governor_config, DefaultGovernorConfig};

/// Application state shared across handlers
pub struct AppState {
    pub gateway: Arc<IngestionGateway>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(gateway: Arc<IngestionGateway>) -> Self {
        Self {
            gateway,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: String,
    pub reading_count: Option<u64>,
    pub active_incident: Option<bool>,
    pub channels: Vec<String>,
}

/// Create the application router.
///
/// `rate_limit` guards reading ingress only; `metrics` adds `GET /metrics`.
pub fn create_router(
    state: SharedState,
    rate_limit: Option<Arc<DefaultGovernorConfig>>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let mut ingest = post(routes::readings::post_reading);
    if let Some(config) = rate_limit {
        ingest = ingest.layer(GovernorLayer { config });
    }

    let mut router = Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/readings",
            ingest.get(routes::readings::list_readings),
        )
        .route("/api/v1/readings/latest", get(routes::readings::latest_reading))
        .route("/api/v1/incident", get(routes::incident::get_incident))
        .route("/api/v1/incident/:id", patch(routes::incident::patch_incident))
        .route(
            "/api/v1/incident/:id/comments",
            post(routes::incident::post_comment),
        )
        .route(
            "/api/v1/thresholds",
            get(routes::thresholds::get_thresholds).put(routes::thresholds::put_thresholds),
        )
        .route("/api/v1/archives", get(routes::archives::list_archives))
        .route("/api/v1/archives/:id", get(routes::archives::get_archive))
        .with_state(state);

    if let Some(handle) = metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(handle),
        );
    }

    router.layer(TraceLayer::new_for_http())
}

/// Health check handler. Storage failures degrade the status instead of failing.
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let store = state.gateway.store();
    let reading_count = store.reading_count().await;
    let active = store.active_incident().await;

    let healthy = reading_count.is_ok() && active.is_ok();
    if let Err(e) = reading_count.as_ref() {
        warn!("Health check could not count readings: {}", e);
    }

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: if healthy { "ok" } else { "error" }.to_string(),
        reading_count: reading_count.ok(),
        active_incident: active.ok().map(|incident| incident.is_some()),
        channels: state.gateway.fanout().channel_names(),
    })
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx::query=warn", settings.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

/// Register every configured channel; misconfigured ones are skipped
pub fn build_fanout(settings: &NotificationSettings) -> NotificationFanout {
    let mut fanout = NotificationFanout::new(settings.fanout.clone());

    if let Some(email) = &settings.email {
        match EmailChannel::new(email) {
            Ok(channel) => fanout = fanout.with_channel(Arc::new(channel)),
            Err(e) => warn!("Email channel disabled: {}", e),
        }
    }
    if let Some(telegram) = &settings.telegram {
        match TelegramChannel::new(telegram.clone()) {
            Ok(channel) => fanout = fanout.with_channel(Arc::new(channel)),
            Err(e) => warn!("Telegram channel disabled: {}", e),
        }
    }
    if let Some(push) = &settings.push {
        match PushChannel::ntfy(push) {
            Ok(channel) => fanout = fanout.with_channel(Arc::new(channel)),
            Err(e) => warn!("Push channel disabled: {}", e),
        }
    }

    if fanout.channel_count() == 0 {
        warn!("No notification channels configured, alerts will only be logged");
    }
    fanout
}

/// Open the configured store
pub async fn build_store(settings: &Settings) -> Result<Arc<dyn Store>, StorageError> {
    if settings.database.is_memory() {
        return Ok(Arc::new(Repository::new()));
    }
    let store =
        SqliteRepository::connect(&settings.database.url, settings.database.max_connections)
            .await?;
    Ok(Arc::new(store))
}

/// Gateway wired from settings
pub fn build_gateway(settings: &Settings, store: Arc<dyn Store>) -> IngestionGateway {
    IngestionGateway::new(
        store,
        settings.incident.clone(),
        build_fanout(&settings.notifications),
    )
    .with_validator(Validator::new(settings.validation.clone()))
    .with_threshold_defaults(settings.thresholds.to_config())
}

/// Run the server until Ctrl-C
pub async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = build_store(&settings).await?;
    let gateway = Arc::new(build_gateway(&settings, store));

    if settings.mqtt.enabled {
        let bridge = SensorBridge::new(settings.mqtt.clone(), Arc::clone(&gateway));
        tokio::spawn(bridge.run());
    }

    let metrics = PrometheusBuilder::new().install_recorder()?;
    let state = Arc::new(AppState::new(gateway));
    let app = create_router(
        state,
        create_governor_config(&settings.server.rate_limit),
        Some(metrics),
    );

    let addr = settings.server.address();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    })
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use incident_core::IncidentPolicy;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let gateway = IngestionGateway::new(
            Arc::new(Repository::new()),
            IncidentPolicy::default(),
            NotificationFanout::default(),
        );
        create_router(Arc::new(AppState::new(Arc::new(gateway))), None, None)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        role: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder
                .header("x-user-role", role)
                .header("x-user-name", format!("{}-user", role));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["reading_count"], 0);
        assert_eq!(body["active_incident"], false);
    }

    #[tokio::test]
    async fn test_reading_opens_incident() {
        let app = app();

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/readings",
            None,
            Some(json!({ "temp": 9.5, "hum": 40.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["transition"], "created");
        assert_eq!(body["incident"]["counter"], 1);

        let (status, body) = call(&app, Method::GET, "/api/v1/incident", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], true);
        assert_eq!(body["permissions"]["can_comment"], false);

        let (_, latest) = call(&app, Method::GET, "/api/v1/readings/latest", None, None).await;
        assert_eq!(latest["temperature"], 9.5);
    }

    #[tokio::test]
    async fn test_invalid_reading_is_422() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/readings",
            None,
            Some(json!({ "temperature": 5.0, "humidity": 120.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation");

        let (status, _) = call(&app, Method::GET, "/api/v1/readings/latest", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_incident_writes_are_role_gated() {
        let app = app();
        let (_, created) = call(
            &app,
            Method::POST,
            "/api/v1/readings",
            None,
            Some(json!({ "temperature": 12.0, "humidity": 50.0 })),
        )
        .await;
        let id = created["incident"]["id"].as_i64().unwrap();
        let patch_uri = format!("/api/v1/incident/{}", id);
        let comment_uri = format!("/api/v1/incident/{}/comments", id);

        let (status, _) = call(
            &app,
            Method::PATCH,
            &patch_uri,
            Some("operator2"),
            Some(json!({ "action1": { "checked": true } })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            Method::PATCH,
            &patch_uri,
            Some("operator2"),
            Some(json!({ "acknowledged": true, "action2": { "checked": true, "comment": "moved" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["acknowledged_by"], "operator2-user");
        assert_eq!(body["corrective_actions"][1]["checked"], true);

        let (status, _) = call(
            &app,
            Method::POST,
            &comment_uri,
            None,
            Some(json!({ "content": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            Method::POST,
            &comment_uri,
            Some("operator1"),
            Some(json!({ "content": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = call(
            &app,
            Method::POST,
            &comment_uri,
            Some("operator1"),
            Some(json!({ "content": "door was open" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["author"], "operator1-user");

        let (status, _) = call(
            &app,
            Method::PATCH,
            "/api/v1/incident/999",
            Some("admin"),
            Some(json!({ "acknowledged": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // A misspelled field is rejected instead of silently ignored
        let (status, _) = call(
            &app,
            Method::PATCH,
            &patch_uri,
            Some("admin"),
            Some(json!({ "acknowleged": false })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (_, body) = call(&app, Method::GET, "/api/v1/incident", None, None).await;
        assert_eq!(body["incident"]["acknowledged"], true);
    }

    #[tokio::test]
    async fn test_thresholds_admin_only() {
        let app = app();

        let (status, body) = call(&app, Method::GET, "/api/v1/thresholds", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["min_temp"], 2.0);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/thresholds",
            Some("operator1"),
            Some(json!({ "min": 0.0, "max": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/v1/thresholds",
            Some("admin"),
            Some(json!({ "min": 10.0, "max": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_range");

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/v1/thresholds",
            Some("admin"),
            Some(json!({ "min": 0.0, "max": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["max_temp"], 10.0);
        assert_eq!(body["updated_by"], "admin-user");
    }

    #[tokio::test]
    async fn test_closed_incident_is_archived() {
        let app = app();
        for temperature in [11.0, 4.0] {
            call(
                &app,
                Method::POST,
                "/api/v1/readings",
                None,
                Some(json!({ "temperature": temperature, "humidity": 50.0 })),
            )
            .await;
        }

        let (status, body) = call(&app, Method::GET, "/api/v1/archives", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["count"], 1);
        let id = body["data"][0]["id"].as_i64().unwrap();

        let (status, archive) =
            call(&app, Method::GET, &format!("/api/v1/archives/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(archive["counter"], 1);

        let (status, _) = call(&app, Method::GET, "/api/v1/archives/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, incident) = call(&app, Method::GET, "/api/v1/incident", None, None).await;
        assert_eq!(incident, json!({ "active": false }));

        let (_, readings) = call(&app, Method::GET, "/api/v1/readings?limit=5000", None, None).await;
        assert_eq!(readings["meta"]["limit"], 1000);
        assert_eq!(readings["meta"]["count"], 2);
    }
}
