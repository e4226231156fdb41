//! Single request/response exchange over the hyper client.
//! Retries, sessions and status classification live in the transport.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{HeaderMap, Method, Request, Uri};
use std::time::Duration;
use tokio::time::timeout;

use super::HyperClient;
use crate::error::{AgentError, Result};

/// Raw response as received from the server.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Canonical reason phrase for the status code.
    pub fn reason(&self) -> &'static str {
        hyper::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    }

    /// Body decoded as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Makes a request with the given method, headers and optional body.
pub async fn send(
    client: &HyperClient,
    method: Method,
    uri: Uri,
    headers: &[(&str, String)],
    body: Option<Bytes>,
    timeout_duration: Duration,
) -> Result<Response> {
    let uri_str = uri.to_string();

    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }

    let req_body: BoxBody<Bytes, hyper::Error> = if let Some(body_bytes) = body {
        Full::new(body_bytes)
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed()
    } else {
        Empty::<Bytes>::new()
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed()
    };

    let req = builder
        .body(req_body)
        .map_err(|e| AgentError::MalformedUrl(format!("{uri_str}: {e}")))?;

    let response = match timeout(timeout_duration, client.request(req)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::debug!(
                uri = %uri_str,
                error = %e,
                error_debug = ?e,
                "Hyper client request failed"
            );
            return Err(AgentError::Network(format!("{e} contacting: {uri_str}")));
        }
        Err(_) => {
            tracing::debug!(
                uri = %uri_str,
                timeout = ?timeout_duration,
                "Request timed out"
            );
            return Err(AgentError::Network(format!(
                "request timed out after {:?} contacting: {}",
                timeout_duration, uri_str
            )));
        }
    };

    let status = response.status().as_u16();
    let headers = response.headers().clone();

    let (_, body_stream) = response.into_parts();
    let body = body_stream
        .collect()
        .await
        .map_err(|e| AgentError::Network(format!("failed to read response body from {uri_str}: {e}")))?
        .to_bytes();

    Ok(Response {
        status,
        headers,
        body,
    })
}
