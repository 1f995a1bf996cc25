//! Account, API registry and preference routes.
//!
//! - `POST /signup`                 : Create an account
//! - `POST /login`                  : Check credentials
//! - `POST /get_apis`               : List a user's registered APIs
//! - `POST /get_files`              : List a user's files
//! - `POST /create_api`             : Register an API descriptor
//! - `POST /remove_api`             : Unregister an API
//! - `POST /update_user_dash_config`: Replace dashboard preferences
//!
//! Users are identified by the `username` field (their email).

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tilecast_core::{ApiCatalog, ApiDescriptor};
use tracing::info;

use crate::SharedState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            endpoint: None,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct UserRequest {
    pub(crate) username: String,
}

#[derive(Deserialize)]
pub(crate) struct SignupRequest {
    username: String,
    password: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub(crate) struct CreateApiRequest {
    username: String,
    endpoint: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    body_format: String,
    /// Defaults to true; set false for endpoints that change data.
    #[serde(default)]
    safe_for_fetch: Option<bool>,
}

#[derive(Deserialize)]
pub(crate) struct RemoveApiRequest {
    username: String,
    endpoint: String,
}

#[derive(Deserialize)]
pub(crate) struct PreferencesRequest {
    username: String,
    #[serde(alias = "preferences")]
    dash_preferences: Value,
}

#[derive(Serialize, Deserialize)]
pub struct ApisResponse {
    #[serde(rename = "APIs")]
    pub apis: ApiCatalog,
}

#[derive(Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Map<String, Value>,
}

pub(crate) async fn signup_handler(
    State(state): State<SharedState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    let profile = state.registry.signup(&req.username, &req.password, &req.name).await?;
    Ok(Json(MessageResponse {
        name: Some(profile.name),
        ..MessageResponse::new("Signup successful")
    }))
}

pub(crate) async fn login_handler(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let profile = state.registry.login(&req.username, &req.password).await?;
    info!(email = %profile.email, "Login successful");
    Ok(Json(MessageResponse {
        name: Some(profile.name),
        ..MessageResponse::new("Login successful")
    }))
}

pub(crate) async fn get_apis_handler(
    State(state): State<SharedState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<ApisResponse>, ApiError> {
    let apis = state.registry.apis(&req.username).await?;
    Ok(Json(ApisResponse { apis }))
}

pub(crate) async fn get_files_handler(
    State(state): State<SharedState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<FilesResponse>, ApiError> {
    let files = state.registry.files(&req.username).await?;
    Ok(Json(FilesResponse { files }))
}

pub(crate) async fn create_api_handler(
    State(state): State<SharedState>,
    Json(req): Json<CreateApiRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut descriptor = ApiDescriptor::new(req.description, req.body_format);
    if req.safe_for_fetch == Some(false) {
        descriptor = descriptor.mutating();
    }
    state
        .registry
        .register_api(&req.username, &req.endpoint, descriptor)
        .await?;
    Ok(Json(MessageResponse {
        endpoint: Some(req.endpoint),
        ..MessageResponse::new("API created successfully")
    }))
}

pub(crate) async fn remove_api_handler(
    State(state): State<SharedState>,
    Json(req): Json<RemoveApiRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.registry.remove_api(&req.username, &req.endpoint).await?;
    Ok(Json(MessageResponse {
        endpoint: Some(req.endpoint),
        ..MessageResponse::new("API removed successfully")
    }))
}

pub(crate) async fn update_preferences_handler(
    State(state): State<SharedState>,
    Json(req): Json<PreferencesRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .registry
        .set_preferences(&req.username, req.dash_preferences)
        .await?;
    Ok(Json(MessageResponse::new("Dashboard preferences updated")))
}
