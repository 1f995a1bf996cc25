//! HTTP endpoint invoker: performs the calls the model asks for.

use std::time::Duration;

use async_trait::async_trait;
use tilecast_config::{DashboardConfig, EndpointPolicy};
use tilecast_core::{ApiCatalog, CallResult, EndpointInvoker, FetchRequest};
use tracing::{debug, warn};

/// POSTs JSON bodies to `base_url + endpoint`.
///
/// Every outcome becomes a [`CallResult`]; nothing here ends a run.
pub struct HttpInvoker {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    policy: EndpointPolicy,
    catalog: ApiCatalog,
}

impl HttpInvoker {
    /// Invoker with a 30 second timeout and the `Registered` policy over an
    /// empty catalog.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::build(base_url.into(), Duration::from_secs(30))
    }

    /// Invoker configured from the `[dashboard]` section.
    pub fn from_config(config: &DashboardConfig, catalog: ApiCatalog) -> Self {
        Self::build(
            config.endpoint_base_url.clone(),
            Duration::from_secs(config.endpoint_timeout_secs),
        )
        .with_policy(config.endpoint_policy, catalog)
    }

    fn build(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
            policy: EndpointPolicy::default(),
            catalog: ApiCatalog::new(),
        }
    }

    /// Restrict which endpoints may be called, against the user's catalog.
    pub fn with_policy(mut self, policy: EndpointPolicy, catalog: ApiCatalog) -> Self {
        self.policy = policy;
        self.catalog = catalog;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Why `endpoint` may not be called, if it may not.
    fn rejection(&self, endpoint: &str) -> Option<String> {
        match self.policy {
            EndpointPolicy::Any => None,
            EndpointPolicy::Registered => (!self.catalog.contains(endpoint))
                .then(|| format!("endpoint {endpoint} is not one of the available APIs")),
            EndpointPolicy::SafeOnly => match self.catalog.get(endpoint) {
                None => Some(format!("endpoint {endpoint} is not one of the available APIs")),
                Some(d) if !d.safe_for_fetch => Some(format!(
                    "endpoint {endpoint} modifies data and may not be called automatically"
                )),
                Some(_) => None,
            },
        }
    }
}

#[async_trait]
impl EndpointInvoker for HttpInvoker {
    async fn invoke(&self, request: &FetchRequest) -> CallResult {
        let endpoint = request.endpoint();

        if let Some(reason) = self.rejection(endpoint) {
            warn!(endpoint, policy = ?self.policy, "Endpoint call refused");
            return CallResult::failed(reason, None, "");
        }

        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, body = ?request.body(), "Calling endpoint");

        let response = match self.client.post(&url).json(request.body()).send().await {
            Ok(r) => r,
            Err(e) => {
                let error = if e.is_timeout() {
                    format!("request to {url} timed out after {}s", self.timeout.as_secs())
                } else {
                    format!("request to {url} failed: {e}")
                };
                warn!(%error, "Endpoint call failed");
                return CallResult::failed(error, e.status().map(|s| s.as_u16()), "");
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read endpoint response");
                return CallResult::failed(
                    format!("failed to read response from {url}: {e}"),
                    Some(status.as_u16()),
                    "",
                );
            }
        };

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Endpoint returned error status");
            return CallResult::failed(
                format!("HTTP {status} from {url}"),
                Some(status.as_u16()),
                text,
            );
        }

        CallResult::ok(status.as_u16(), text)
    }
}
