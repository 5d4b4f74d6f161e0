use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use crate::auth::Credential;
use crate::error::TransportError;

static USER_AGENT: LazyLock<String> = LazyLock::new(|| {
    format!(
        "dashrewrite/{} {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
});

#[derive(Debug, Serialize)]
pub struct RewritePayload<'a> {
    pub text: &'a str,
}

/// Build the rewrite POST. `text` must already be trimmed.
pub fn build_request(
    url: &str,
    text: &str,
    credential: &Credential,
    authorization_scheme: Option<&str>,
) -> Result<Request<Full<Bytes>>, TransportError> {
    let body = serde_json::to_vec(&RewritePayload { text })
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

    Request::builder()
        .method("POST")
        .uri(url)
        .header("Content-Type", "application/json")
        .header("Authorization", credential.header_value(authorization_scheme))
        .header("User-Agent", USER_AGENT.as_str())
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

/// Reason phrase as sent by the server, else the canonical one for the code.
pub fn reason_phrase<B>(response: &Response<B>) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(str::to_string))
        .unwrap_or_default()
}

/// `"HTTP <status>: <reason>"`, used when an error response has no usable body.
pub fn status_line(status: StatusCode, reason: &str) -> String {
    ["HTTP ", status.as_str(), ": ", reason].concat()
}

/// Success statuses that never carry a body.
pub fn has_no_body(status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT
}

/// Read an error response body as its message. A blank or unreadable body
/// degrades to `fallback`.
pub async fn read_error_message<B>(body: B, fallback: String) -> String
where
    B: Body,
    B::Error: std::fmt::Display,
{
    match body.collect().await {
        Ok(collected) => {
            let text = String::from_utf8_lossy(&collected.to_bytes()).into_owned();
            if text.trim().is_empty() {
                fallback
            } else {
                text
            }
        }
        Err(e) => {
            debug!(error = %e, "Failed to read error response body");
            fallback
        }
    }
}
