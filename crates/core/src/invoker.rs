//! EndpointInvoker trait: one HTTP call described by the model.

use async_trait::async_trait;

use crate::call::CallResult;
use crate::plan::FetchRequest;

/// Executes a [`FetchRequest`] and reports the outcome as a [`CallResult`].
///
/// Never fails past its boundary: transport errors, timeouts and HTTP
/// error statuses all come back as `CallResult { success: false, .. }`.
#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    async fn invoke(&self, request: &FetchRequest) -> CallResult;
}
