//! User registry: accounts, registered APIs, preferences and the last
//! generated dashboard, persisted as one JSON document.
//!
//! Storage location: `~/.tilecast/server.json` (configurable).
//!
//! The whole registry is loaded into memory on open and written back on
//! every mutation, while the write lock is held, so the file always matches
//! the last successful mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tilecast_core::error::RegistryError;
use tilecast_core::{ApiCatalog, ApiDescriptor, DashboardPlan};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Seeded when the registry file does not exist yet.
pub const DEMO_EMAIL: &str = "demo@nalflo.com";
const DEMO_PASSWORD: &str = "demo123";
const DEMO_NAME: &str = "Demo User";

/// A dashboard as persisted for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDashboard {
    pub plan: DashboardPlan,
    pub generated_at: DateTime<Utc>,
}

impl StoredDashboard {
    pub fn new(plan: DashboardPlan) -> Self {
        Self {
            plan,
            generated_at: Utc::now(),
        }
    }

    /// Older than `window` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.generated_at > window
    }
}

/// One account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password_hash: String,
    pub name: String,
    pub email: String,
    #[serde(default = "empty_object")]
    pub dash_preferences: Value,
    #[serde(default)]
    pub apis: ApiCatalog,
    #[serde(default)]
    pub files: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<StoredDashboard>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl UserRecord {
    fn new(email: &str, password: &str, name: &str) -> Self {
        Self {
            password_hash: hash_password(email, password),
            name: name.to_string(),
            email: email.to_string(),
            dash_preferences: empty_object(),
            apis: ApiCatalog::new(),
            files: Map::new(),
            dashboard: None,
        }
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}

/// What a generation run needs from a user, copied out of the registry.
#[derive(Debug, Clone)]
pub struct GenerationInputs {
    pub preferences: Option<Value>,
    pub apis: ApiCatalog,
}

/// SHA-256 of `email:password`, hex encoded.
fn hash_password(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

type Users = BTreeMap<String, UserRecord>;

/// JSON-file backed user store.
#[derive(Clone)]
pub struct UserRegistry {
    path: PathBuf,
    users: Arc<RwLock<Users>>,
}

impl UserRegistry {
    /// Open the registry at `path`, seeding the demo account when the file
    /// does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let users = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Users>(&content).map_err(|e| {
                RegistryError::Storage(format!("Corrupted registry {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut users = Users::new();
                users.insert(
                    DEMO_EMAIL.to_string(),
                    UserRecord::new(DEMO_EMAIL, DEMO_PASSWORD, DEMO_NAME),
                );
                write_users(&path, &users)?;
                info!(path = %path.display(), "Created registry with demo account");
                users
            }
            Err(e) => {
                return Err(RegistryError::Storage(format!(
                    "Failed to read registry {}: {e}",
                    path.display()
                )));
            }
        };

        debug!(path = %path.display(), users = users.len(), "User registry loaded");
        Ok(Self {
            path,
            users: Arc::new(RwLock::new(users)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Apply `f` to a copy of one user and persist. The in-memory record is
    /// replaced only once the write succeeded.
    async fn mutate_user<T>(
        &self,
        email: &str,
        f: impl FnOnce(&mut UserRecord) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut users = self.users.write().await;
        let previous = users
            .get(email)
            .cloned()
            .ok_or_else(|| RegistryError::UserNotFound(email.to_string()))?;
        let mut updated = previous.clone();
        let out = f(&mut updated)?;

        users.insert(email.to_string(), updated);
        if let Err(e) = write_users(&self.path, &users) {
            users.insert(email.to_string(), previous);
            return Err(e);
        }
        Ok(out)
    }

    /// Read something from one user.
    async fn read_user<T>(
        &self,
        email: &str,
        f: impl FnOnce(&UserRecord) -> T,
    ) -> Result<T, RegistryError> {
        let users = self.users.read().await;
        users
            .get(email)
            .map(f)
            .ok_or_else(|| RegistryError::UserNotFound(email.to_string()))
    }

    pub async fn signup(&self, email: &str, password: &str, name: &str) -> Result<UserProfile, RegistryError> {
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(RegistryError::UserExists(email.to_string()));
        }
        users.insert(email.to_string(), UserRecord::new(email, password, name));
        if let Err(e) = write_users(&self.path, &users) {
            users.remove(email);
            return Err(e);
        }
        info!(email, "User signed up");
        Ok(UserProfile {
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    /// Check credentials. Unknown users and wrong passwords are
    /// indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, RegistryError> {
        let users = self.users.read().await;
        match users.get(email) {
            Some(user) if user.password_hash == hash_password(email, password) => Ok(UserProfile {
                name: user.name.clone(),
                email: user.email.clone(),
            }),
            _ => Err(RegistryError::InvalidCredentials),
        }
    }

    pub async fn apis(&self, email: &str) -> Result<ApiCatalog, RegistryError> {
        self.read_user(email, |u| u.apis.clone()).await
    }

    pub async fn files(&self, email: &str) -> Result<Map<String, Value>, RegistryError> {
        self.read_user(email, |u| u.files.clone()).await
    }

    /// Register an endpoint for `email`. Paths start with `/` and are unique
    /// across all users.
    pub async fn register_api(
        &self,
        email: &str,
        path: &str,
        descriptor: ApiDescriptor,
    ) -> Result<(), RegistryError> {
        if !path.starts_with('/') {
            return Err(RegistryError::InvalidEndpoint(path.to_string()));
        }

        let mut users = self.users.write().await;
        if let Some(owner) = users.values().find(|u| u.apis.contains(path)) {
            return Err(RegistryError::EndpointTaken {
                endpoint: path.to_string(),
                owner: owner.email.clone(),
            });
        }
        let user = users
            .get_mut(email)
            .ok_or_else(|| RegistryError::UserNotFound(email.to_string()))?;
        user.apis.insert(path, descriptor);
        if let Err(e) = write_users(&self.path, &users) {
            if let Some(user) = users.get_mut(email) {
                user.apis.remove(path);
            }
            return Err(e);
        }
        info!(email, endpoint = path, "API registered");
        Ok(())
    }

    pub async fn remove_api(&self, email: &str, path: &str) -> Result<ApiDescriptor, RegistryError> {
        self.mutate_user(email, |user| {
            user.apis
                .remove(path)
                .ok_or_else(|| RegistryError::NotFound(format!("endpoint {path}")))
        })
        .await
    }

    pub async fn set_preferences(&self, email: &str, preferences: Value) -> Result<(), RegistryError> {
        self.mutate_user(email, |user| {
            user.dash_preferences = preferences;
            Ok(())
        })
        .await
    }

    /// Snapshot of preferences and catalog. Empty preferences count as none.
    pub async fn generation_inputs(&self, email: &str) -> Result<GenerationInputs, RegistryError> {
        self.read_user(email, |u| {
            let preferences = match &u.dash_preferences {
                Value::Null => None,
                Value::Object(map) if map.is_empty() => None,
                other => Some(other.clone()),
            };
            GenerationInputs {
                preferences,
                apis: u.apis.clone(),
            }
        })
        .await
    }

    pub async fn dashboard(&self, email: &str) -> Result<Option<StoredDashboard>, RegistryError> {
        self.read_user(email, |u| u.dashboard.clone()).await
    }

    pub async fn save_dashboard(
        &self,
        email: &str,
        plan: DashboardPlan,
    ) -> Result<StoredDashboard, RegistryError> {
        self.mutate_user(email, |user| {
            let stored = StoredDashboard::new(plan);
            user.dashboard = Some(stored.clone());
            Ok(stored)
        })
        .await
    }
}

fn write_users(path: &Path, users: &Users) -> Result<(), RegistryError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            RegistryError::Storage(format!("Failed to create registry directory: {e}"))
        })?;
    }

    let content = serde_json::to_string_pretty(users)
        .map_err(|e| RegistryError::Storage(format!("Failed to serialize registry: {e}")))?;

    std::fs::write(path, content)
        .map_err(|e| RegistryError::Storage(format!("Failed to write registry file: {e}")))
}
