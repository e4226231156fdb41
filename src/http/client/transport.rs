//! Resilient request channel to the orchestration server.
//!
//! Every call is retried until it succeeds or fails with a fatal error:
//! rate-limited calls (429, 503) back off using the shared counter and are
//! retried indefinitely, transient failures (network, other 5xx) back off
//! linearly and give up after the retry horizon or when the caller disabled
//! retries for the call.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use hyper::header::{LOCATION, SET_COOKIE};
use hyper::{Method, Uri};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};
use url::Url;

use super::request::{self, Response};
use super::retry::{jitter, RateLimitCounter, RetryPolicy};
use super::{create_client, status, HyperClient};
use crate::config::{Config, ConfigTrait};
use crate::error::{AgentError, Result, RetryClass};
use crate::http::session::Session;

const UNAUTHORIZED: u16 = 401;
const MAX_LOGGED_BODY: usize = 1000;
const MAX_REDIRECTS: u32 = 10;
const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Basic credentials used when no session cookie is available.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn authorization(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything a transport shares with the rest of the process.
#[derive(Debug, Clone)]
pub struct TransportContext {
    pub cookie_file: PathBuf,
    pub cookie_name: String,
    pub credentials: Option<Credentials>,
    pub rate_limits: Arc<RateLimitCounter>,
    pub cancel: CancellationToken,
    pub request_timeout: Duration,
}

impl TransportContext {
    pub fn from_cfg(cfg: &Config, cancel: CancellationToken) -> Self {
        let server = cfg.server();
        let credentials = match (&server.username, &server.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        Self {
            cookie_file: cfg.cookie_file(),
            cookie_name: cfg.cookie_name().to_string(),
            credentials,
            rate_limits: Arc::new(RateLimitCounter::new()),
            cancel,
            request_timeout: cfg.request_timeout(),
        }
    }
}

/// Options of a single call.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions<'a> {
    pub content_type: Option<&'a str>,
    pub accept: Option<&'a str>,
    pub retry: bool,
}

impl Default for CallOptions<'_> {
    fn default() -> Self {
        Self {
            content_type: Some("application/xml"),
            accept: Some("application/xml"),
            retry: true,
        }
    }
}

pub struct Transport {
    client: HyperClient,
    policy: RetryPolicy,
    ctx: TransportContext,
    session: OnceCell<Session>,
}

impl Transport {
    pub fn new(ctx: TransportContext, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            policy,
            ctx,
            session: OnceCell::new(),
        })
    }

    pub fn from_cfg(cfg: &Config, cancel: CancellationToken) -> Result<Self> {
        Self::new(
            TransportContext::from_cfg(cfg, cancel),
            RetryPolicy::from_cfg(cfg.retry()),
        )
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitCounter> {
        &self.ctx.rate_limits
    }

    pub async fn get(&self, url: &str, opts: CallOptions<'_>) -> Result<(Response, String)> {
        self.call(Method::GET, url, None, opts).await
    }

    pub async fn put(&self, url: &str, body: Option<Bytes>, opts: CallOptions<'_>) -> Result<(Response, String)> {
        self.call(Method::PUT, url, body, opts).await
    }

    pub async fn post(&self, url: &str, body: Option<Bytes>, opts: CallOptions<'_>) -> Result<(Response, String)> {
        self.call(Method::POST, url, body, opts).await
    }

    pub async fn delete(&self, url: &str, body: Option<Bytes>, opts: CallOptions<'_>) -> Result<(Response, String)> {
        self.call(Method::DELETE, url, body, opts).await
    }

    /// Drops the session cookie for `url` so the next call authenticates again.
    pub fn delete_local_cookie(&self, url: &str) -> Result<()> {
        let url = parse_url(url)?;
        let host = url.host_str().unwrap_or_default();
        self.session()?.delete_cookie(host, url.path())
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| Session::open(&self.ctx.cookie_file, self.ctx.cookie_name.clone()))
    }

    async fn call(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        opts: CallOptions<'_>,
    ) -> Result<(Response, String)> {
        let parsed = parse_url(url)?;
        // Session is bound on first use.
        self.session()?;

        debug!(
            component = "transport",
            event = "request",
            method = %method,
            url = %url,
            "contacting the server"
        );

        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if self.ctx.cancel.is_cancelled() {
                return Err(AgentError::Interrupted);
            }

            let outcome = tokio::select! {
                _ = self.ctx.cancel.cancelled() => return Err(AgentError::Interrupted),
                outcome = self.attempt(&method, &parsed, body.clone(), &opts) => outcome,
            };
            let err = match outcome {
                Ok(resp) => {
                    self.ctx.rate_limits.decrement();
                    let text = resp.text();
                    return Ok((resp, text));
                }
                Err(err) => err,
            };

            let delay = match err.retry_class() {
                RetryClass::Fatal => return Err(err),
                RetryClass::RateLimited => self.policy.throttle_delay(self.ctx.rate_limits.get()),
                RetryClass::Transient => {
                    if !opts.retry || self.policy.is_expired(started.elapsed()) {
                        error!(
                            component = "transport",
                            event = "give_up",
                            method = %method,
                            url = %url,
                            error = %err,
                            "HTTP call error"
                        );
                        return Err(err);
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    attempt = attempt.saturating_add(1);
                    delay
                }
            };

            let delay = jitter(delay, rand::random::<f64>());
            let counter = self.ctx.rate_limits.increment();
            warn!(
                component = "transport",
                event = "retry_scheduled",
                method = %method,
                url = %url,
                error = %err,
                sleep_ms = delay.as_millis() as u64,
                rate_limit_counter = counter,
                "request failed, retrying"
            );

            tokio::select! {
                _ = self.ctx.cancel.cancelled() => return Err(AgentError::Interrupted),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One request, following redirects, then status classification.
    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        body: Option<Bytes>,
        opts: &CallOptions<'_>,
    ) -> Result<Response> {
        let session = self.session()?;
        let mut method = method.clone();
        let mut url = url.clone();
        let mut body = body;
        let mut hops = 0;

        let resp = loop {
            let resp = self.authenticated(session, &method, &url, body.clone(), opts).await?;
            log_response(&resp);

            let Some(next) = redirect_target(&url, &resp)? else {
                break resp;
            };
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(AgentError::Internal(format!(
                    "too many redirects ({MAX_REDIRECTS}) following {url}"
                )));
            }
            debug!(component = "transport", event = "redirect", status = resp.status, from = %url, to = %next, "following redirect");
            if switches_to_get(&method, resp.status) {
                method = Method::GET;
                body = None;
            }
            url = next;
        };

        status::check(method.as_str(), url.as_str(), resp.status, resp.reason(), &resp.text())?;
        Ok(resp)
    }

    /// Sends with the session cookie when one applies, falling back to basic
    /// credentials on 401; without a cookie credentials are sent directly.
    async fn authenticated(
        &self,
        session: &Session,
        method: &Method,
        url: &Url,
        body: Option<Bytes>,
        opts: &CallOptions<'_>,
    ) -> Result<Response> {
        let host = url.host_str().unwrap_or_default();
        let path = url.path();
        let secure = url.scheme() == "https";

        let mut headers: Vec<(&str, String)> = Vec::with_capacity(4);
        if let Some(ct) = opts.content_type.filter(|ct| !ct.is_empty()) {
            headers.push(("content-type", ct.to_string()));
        }
        if let Some(accept) = opts.accept.filter(|a| !a.is_empty()) {
            headers.push(("accept", accept.to_string()));
        }
        if let Some(cookie) = session.cookie_header(host, path, secure) {
            headers.push(("cookie", cookie));
        }

        if !session.has_auth_cookie(host, path, secure) {
            if let Some(creds) = &self.ctx.credentials {
                headers.push(("authorization", creds.authorization()));
            }
            return self.exchange(session, method, url, &headers, body).await;
        }

        let resp = self.exchange(session, method, url, &headers, body.clone()).await?;
        match (&self.ctx.credentials, resp.status) {
            (Some(creds), UNAUTHORIZED) => {
                debug!(component = "transport", event = "session_expired", url = %url, "session rejected, retrying with credentials");
                headers.retain(|(name, _)| *name != "cookie");
                headers.push(("authorization", creds.authorization()));
                self.exchange(session, method, url, &headers, body).await
            }
            _ => Ok(resp),
        }
    }

    async fn exchange(
        &self,
        session: &Session,
        method: &Method,
        url: &Url,
        headers: &[(&str, String)],
        body: Option<Bytes>,
    ) -> Result<Response> {
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| AgentError::MalformedUrl(format!("{url}: {e}")))?;
        let resp = request::send(
            &self.client,
            method.clone(),
            uri,
            headers,
            body,
            self.ctx.request_timeout,
        )
        .await?;

        let set_cookies = resp
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        if let Err(e) = session.store_response_cookies(
            url.host_str().unwrap_or_default(),
            url.path(),
            url.scheme() == "https",
            set_cookies,
        ) {
            warn!(component = "transport", event = "cookie_jar_write_failed", error = %e, "failed to persist session cookies");
        }
        Ok(resp)
    }
}

/// Absolute target of a redirect response, `None` for any other response.
fn redirect_target(current: &Url, resp: &Response) -> Result<Option<Url>> {
    if !REDIRECT_STATUSES.contains(&resp.status) {
        return Ok(None);
    }
    let Some(location) = resp.header(LOCATION.as_str()) else {
        return Ok(None);
    };
    let next = current
        .join(location)
        .map_err(|e| AgentError::MalformedUrl(format!("redirect to {location}: {e}")))?;
    match next.scheme() {
        "http" | "https" => Ok(Some(next)),
        _ => Err(AgentError::MalformedUrl(format!("unsupported redirect: {next}"))),
    }
}

/// 303 always, and 301/302 for non-GET/HEAD requests, are replayed as GET.
fn switches_to_get(method: &Method, status: u16) -> bool {
    match status {
        303 => *method != Method::HEAD,
        301 | 302 => *method != Method::GET && *method != Method::HEAD,
        _ => false,
    }
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| AgentError::MalformedUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(AgentError::MalformedUrl(format!("unsupported url: {url}"))),
    }
}

fn log_response(resp: &Response) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let text = resp.text();
    let content = if text.chars().count() > MAX_LOGGED_BODY {
        let cut: String = text.chars().take(MAX_LOGGED_BODY).collect();
        format!("{cut}\n::::: Content truncated :::::")
    } else {
        text
    };
    trace!(component = "transport", event = "response", status = resp.status, content = %content, "received response");
}
