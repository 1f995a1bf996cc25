//! HTTP gateway for Tilecast.
//!
//! Exposes the account and API registry routes used by the frontend, plus
//! the dashboard routes that drive the generation loop. All bodies are
//! JSON; every route except `/health` is `POST`.
//!
//! Built on Axum.

pub mod accounts;
pub mod dashboard;
pub mod error;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tilecast_agent::DashboardAgent;
use tilecast_config::AppConfig;
use tilecast_core::event::{DomainEvent, EventBus};
use tilecast_registry::UserRegistry;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub registry: UserRegistry,
    pub agent: Arc<DashboardAgent>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = match state.config.gateway.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(origin),
        Err(_) => {
            warn!(origin = %state.config.gateway.cors_origin, "Invalid CORS origin, allowing none");
            CorsLayer::new()
        }
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers([header::CONTENT_TYPE])
    .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/signup", post(accounts::signup_handler))
        .route("/login", post(accounts::login_handler))
        .route("/get_apis", post(accounts::get_apis_handler))
        .route("/get_files", post(accounts::get_files_handler))
        .route("/create_api", post(accounts::create_api_handler))
        .route("/remove_api", post(accounts::remove_api_handler))
        .route(
            "/update_user_dash_config",
            post(accounts::update_preferences_handler),
        )
        .route("/get_dashboard", post(dashboard::get_dashboard_handler))
        .route(
            "/force_refresh_dashboard",
            post(dashboard::force_refresh_handler),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Log domain events as they happen. Ends when the bus is dropped.
fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::EndpointCalled {
                        run_id,
                        endpoint,
                        success,
                        duration_ms,
                        ..
                    } => debug!(%run_id, %endpoint, success, duration_ms, "Endpoint called"),
                    other => debug!(event = ?other, "Domain event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = tilecast_providers::router::build_from_config(&config);
    let model = router
        .default()
        .ok_or("No default provider configured; set an API key")?;

    let registry_path = config.registry.resolved_path();
    let registry = UserRegistry::open(&registry_path)?;
    info!(
        path = %registry_path.display(),
        users = registry.user_count().await,
        "User registry opened"
    );

    let event_bus = Arc::new(EventBus::default());
    spawn_event_logger(&event_bus);

    let agent = Arc::new(DashboardAgent::from_config(model, &config).with_event_bus(event_bus.clone()));

    let state = Arc::new(GatewayState {
        config,
        registry,
        agent,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tilecast_agent::test_helpers::{
        RecordingInvoker, ScriptedModel, fetch_response, finished_response,
    };
    use tilecast_core::{DashboardPlan, GridSize, ProviderError};
    use tilecast_registry::DEMO_EMAIL;
    use tower::ServiceExt;

    use crate::dashboard::DashboardResponse;

    struct Harness {
        _dir: tempfile::TempDir,
        state: SharedState,
        invoker: Arc<RecordingInvoker>,
    }

    fn harness(model: ScriptedModel) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = UserRegistry::open(dir.path().join("server.json")).unwrap();
        let invoker = Arc::new(RecordingInvoker::new());
        let agent = DashboardAgent::new(Arc::new(model), "scripted-1").with_invoker(invoker.clone());
        let state = Arc::new(GatewayState {
            config: AppConfig::default(),
            registry,
            agent: Arc::new(agent),
        });
        Harness {
            _dir: dir,
            state,
            invoker,
        }
    }

    async fn post(state: &SharedState, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let h = harness(ScriptedModel::new(vec![]));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = build_router(h.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_login_flow() {
        let h = harness(ScriptedModel::new(vec![]));
        let (status, _) = post(
            &h.state,
            "/signup",
            json!({"username": "ada@example.com", "password": "pw", "name": "Ada"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post(
            &h.state,
            "/login",
            json!({"username": "ada@example.com", "password": "pw"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Ada");

        let (status, body) = post(
            &h.state,
            "/login",
            json!({"username": "ada@example.com", "password": "wrong"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("Invalid"));

        let (status, _) = post(
            &h.state,
            "/signup",
            json!({"username": "ada@example.com", "password": "pw", "name": "Ada"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_registry_routes() {
        let h = harness(ScriptedModel::new(vec![]));
        let (status, body) = post(
            &h.state,
            "/create_api",
            json!({
                "username": DEMO_EMAIL,
                "endpoint": "/api/users",
                "description": "User statistics",
                "body_format": "{'limit': int}",
                "function_name": "users",
                "code": "return jsonify([])"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoint"], "/api/users");

        let (status, body) = post(&h.state, "/get_apis", json!({"username": DEMO_EMAIL})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["APIs"]["/api/users"]["description"], "User statistics");

        let (status, _) = post(
            &h.state,
            "/create_api",
            json!({"username": DEMO_EMAIL, "endpoint": "api/bad"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(
            &h.state,
            "/remove_api",
            json!({"username": DEMO_EMAIL, "endpoint": "/api/users"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = post(
            &h.state,
            "/remove_api",
            json!({"username": DEMO_EMAIL, "endpoint": "/api/users"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let h = harness(ScriptedModel::new(vec![]));
        let (status, _) = post(&h.state, "/get_files", json!({"username": "ghost@example.com"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = post(&h.state, "/get_dashboard", json!({"username": "ghost@example.com"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_dashboard_generates_then_serves_stored() {
        let h = harness(ScriptedModel::new(vec![
            Ok(fetch_response("/api/users", "{'limit': 10}")),
            Ok(finished_response(2, 2, &[("users", "[[0, 0], [0, 1]]")])),
        ]));
        h.state
            .registry
            .register_api(DEMO_EMAIL, "/api/users", tilecast_core::ApiDescriptor::new("Users", "{}"))
            .await
            .unwrap();

        let (status, body) = post(&h.state, "/get_dashboard", json!({"username": DEMO_EMAIL})).await;
        assert_eq!(status, StatusCode::OK);
        let first: DashboardResponse = serde_json::from_value(body).unwrap();
        assert!(first.regenerated);
        assert!(!first.stale);
        assert_eq!(first.dashboard.tiles[0].id, "users");
        assert_eq!(h.invoker.calls().await.len(), 1);

        // Fresh plan is served from the registry; the script is exhausted,
        // so a second run would fail.
        let (status, body) = post(&h.state, "/get_dashboard", json!({"username": DEMO_EMAIL})).await;
        assert_eq!(status, StatusCode::OK);
        let second: DashboardResponse = serde_json::from_value(body).unwrap();
        assert!(!second.regenerated);
        assert_eq!(second.dashboard, first.dashboard);
    }

    #[tokio::test]
    async fn failed_refresh_returns_previous_plan_as_stale() {
        let h = harness(ScriptedModel::new(vec![Err(ProviderError::Network("down".into()))]));
        let previous = DashboardPlan {
            grid_size: GridSize::new(3, 3),
            ..Default::default()
        };
        h.state.registry.save_dashboard(DEMO_EMAIL, previous.clone()).await.unwrap();

        let (status, body) = post(
            &h.state,
            "/force_refresh_dashboard",
            json!({"username": DEMO_EMAIL}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let response: DashboardResponse = serde_json::from_value(body).unwrap();
        assert!(response.stale);
        assert_eq!(response.dashboard, previous);
        assert!(response.error.unwrap().contains("Model unavailable"));
    }

    #[tokio::test]
    async fn failed_first_generation_is_unavailable() {
        let h = harness(ScriptedModel::new(vec![Ok("not json".into())]));
        let (status, body) = post(&h.state, "/get_dashboard", json!({"username": DEMO_EMAIL})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("No dashboard available"));
    }

    #[tokio::test]
    async fn preferences_reach_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(finished_response(1, 1, &[("a", "[[0, 0]]")]))]));
        let h = harness(ScriptedModel::new(vec![]));
        let state = Arc::new(GatewayState {
            config: AppConfig::default(),
            registry: h.state.registry.clone(),
            agent: Arc::new(DashboardAgent::new(model.clone(), "scripted-1").with_invoker(h.invoker.clone())),
        });

        let (status, _) = post(
            &state,
            "/update_user_dash_config",
            json!({"username": DEMO_EMAIL, "dash_preferences": {"focus": "revenue"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = post(&state, "/force_refresh_dashboard", json!({"username": DEMO_EMAIL})).await;
        assert_eq!(status, StatusCode::OK);
        let requests = model.requests().await;
        assert!(requests[0].instructions.contains("\"focus\": \"revenue\""));
    }
}
