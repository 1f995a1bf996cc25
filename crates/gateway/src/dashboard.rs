//! Dashboard routes.
//!
//! - `POST /get_dashboard`          : Stored dashboard, regenerated when
//!   missing or older than `stale_after_hours`
//! - `POST /force_refresh_dashboard`: Always regenerate

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tilecast_core::DashboardPlan;
use tilecast_registry::StoredDashboard;
use tracing::{info, warn};

use crate::SharedState;
use crate::accounts::UserRequest;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub dashboard: DashboardPlan,
    /// When the returned plan was generated; absent for a plan that was
    /// produced by a failed run and not persisted.
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    /// True when this is not a fresh result of the latest run.
    pub stale: bool,
    /// True when a generation run happened during this request.
    pub regenerated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DashboardResponse {
    fn stored(stored: StoredDashboard, stale: bool, regenerated: bool) -> Self {
        Self {
            dashboard: stored.plan,
            generated_at: Some(stored.generated_at),
            stale,
            regenerated,
            error: None,
        }
    }
}

pub(crate) async fn get_dashboard_handler(
    State(state): State<SharedState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let window = Duration::hours(state.config.dashboard.stale_after_hours as i64);

    if let Some(stored) = state.registry.dashboard(&req.username).await?
        && !stored.is_stale(Utc::now(), window)
    {
        return Ok(Json(DashboardResponse::stored(stored, false, false)));
    }

    regenerate(&state, &req.username).await.map(Json)
}

pub(crate) async fn force_refresh_handler(
    State(state): State<SharedState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<DashboardResponse>, ApiError> {
    regenerate(&state, &req.username).await.map(Json)
}

/// Run the agent on a snapshot of the user's inputs.
///
/// Only a run that reached DONE is persisted. Otherwise the previously
/// stored dashboard is returned flagged stale; failing that, whatever
/// layout the failed run left (unpersisted); failing that, 503.
async fn regenerate(state: &SharedState, email: &str) -> Result<DashboardResponse, ApiError> {
    let inputs = state.registry.generation_inputs(email).await?;
    info!(email, apis = inputs.apis.len(), "Generating dashboard");

    let report = state
        .agent
        .run(inputs.preferences.as_ref(), Some(&inputs.apis))
        .await;

    if report.is_done() {
        let iterations = report.iterations;
        if let Some(plan) = report.into_plan() {
            let stored = state.registry.save_dashboard(email, plan).await?;
            info!(email, iterations, "Dashboard stored");
            return Ok(DashboardResponse::stored(stored, false, true));
        }
        return Err(ApiError::unavailable("generation produced no dashboard"));
    }

    let run_error = report
        .error()
        .map(ToString::to_string)
        .unwrap_or_else(|| "generation failed".into());
    warn!(email, error = %run_error, "Dashboard generation failed");

    if let Some(previous) = state.registry.dashboard(email).await? {
        let mut response = DashboardResponse::stored(previous, true, true);
        response.error = Some(run_error);
        return Ok(response);
    }

    match report.into_plan() {
        Some(plan) => Ok(DashboardResponse {
            dashboard: plan,
            generated_at: None,
            stale: true,
            regenerated: true,
            error: Some(run_error),
        }),
        None => Err(ApiError::unavailable(format!(
            "No dashboard available: {run_error}"
        ))),
    }
}
