//! Maps HTTP statuses onto the error taxonomy.

use crate::error::{AgentError, Result};

pub const NOT_FOUND: u16 = 404;
pub const CONFLICT: u16 = 409;
pub const PRECONDITION_FAILED: u16 = 412;
pub const EXPECTATION_FAILED: u16 = 417;
pub const TOO_MANY_REQUESTS: u16 = 429;
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Checks a response status; `Ok` for 1xx and 2xx.
pub fn check(method: &str, url: &str, status: u16, reason: &str, body: &str) -> Result<()> {
    match status {
        100..=299 => Ok(()),
        300..=399 => Err(AgentError::Internal(format!(
            "redirect should have been handled by the http client: {status}: {reason}"
        ))),
        400..=499 => Err(client_error(method, url, status, reason, body)),
        500..=599 => Err(server_error(method, url, status, reason)),
        _ => Err(AgentError::Internal(format!("unknown HTTP return code: {status}"))),
    }
}

fn client_error(method: &str, url: &str, status: u16, reason: &str, body: &str) -> AgentError {
    match status {
        CONFLICT => AgentError::Abort(extract_detail(body).unwrap_or_default()),
        PRECONDITION_FAILED => AgentError::NotYetSet(extract_detail(body).unwrap_or_default()),
        EXPECTATION_FAILED => AgentError::TerminalState(extract_detail(body).unwrap_or_default()),
        TOO_MANY_REQUESTS => AgentError::RateLimited,
        NOT_FOUND => AgentError::NotFound(reason.to_string()),
        _ => {
            let detail = extract_detail(body).unwrap_or_else(|| format!("{reason} ({status})"));
            AgentError::Client {
                status,
                message: format!("Failed calling method {method} on url {url}, with reason: {detail}"),
            }
        }
    }
}

fn server_error(method: &str, url: &str, status: u16, reason: &str) -> AgentError {
    if status == SERVICE_UNAVAILABLE {
        return AgentError::ServiceUnavailable("the server is in maintenance".to_string());
    }
    AgentError::Server {
        status,
        message: format!("Failed calling method {method} on url {url}, with reason: {status}: {reason}"),
    }
}

/// First text node of an XML error body, else the raw body; `None` when empty.
pub fn extract_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match roxmltree::Document::parse(body) {
        Ok(doc) => doc
            .root_element()
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        Err(_) => Some(body.to_string()),
    }
}
