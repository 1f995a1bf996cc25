//! Shared plumbing for streamed provider responses.

use futures::StreamExt;
use tilecast_core::error::ProviderError;
use tracing::warn;

/// Line buffer for a `text/event-stream` body.
///
/// Bytes go in as they arrive; complete `data:` payloads come out. Lines
/// are decoded only once complete, so multi-byte characters split across
/// chunks survive.
#[derive(Default)]
pub(crate) struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    /// Append bytes and drain every complete `data:` payload.
    /// Blank lines, comments and other fields are skipped.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(data) = data_payload(&raw[..line_end]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Whatever is left once the stream has ended without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(rest.trim_ascii())
    }
}

/// The payload of one complete `data:` line.
fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    line.strip_prefix("data:").map(|data| data.trim().to_string())
}

/// Map a non-success provider status to the matching error.
pub(crate) async fn check_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        return Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Drain an SSE response, feeding each `data:` payload to `on_data`.
/// `on_data` returns `false` to stop early (end-of-stream marker).
pub(crate) async fn drain<F>(response: reqwest::Response, mut on_data: F) -> Result<(), ProviderError>
where
    F: FnMut(&str) -> bool,
{
    let mut byte_stream = response.bytes_stream();
    let mut buffer = SseBuffer::default();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = chunk.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
        for payload in buffer.push(&bytes) {
            if !on_data(&payload) {
                return Ok(());
            }
        }
    }

    if let Some(payload) = buffer.finish() {
        on_data(&payload);
    }
    Ok(())
}
