//! Hyper HTTP client configuration for orchestration server calls.
//!
//! A small pool is enough: the agent talks to a single server and issues
//! one request at a time per lifecycle.
//! - Max idle connections per host: 4
//! - Max idle connection duration: 30s
//! - Connection timeout: 10s
//! - TCP keep-alive: 30s

use std::time::Duration;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::dns::GaiResolver;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;

use crate::error::{AgentError, Result};

/// Connection pool configuration constants.
pub const CONNS_PER_HOST: usize = 4;
pub const MAX_IDLE_CONN_DURATION: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type HyperClient = Client<HttpsConnector<HttpConnector<GaiResolver>>, BoxBody<Bytes, hyper::Error>>;

/// Creates a Hyper HTTP client speaking both `http://` and `https://`.
///
/// Redirects are not followed by hyper; the transport treats them as an
/// internal error.
pub fn create_client() -> Result<HyperClient> {
    let resolver = GaiResolver::new();

    let mut http_connector = HttpConnector::new_with_resolver(resolver);
    http_connector.enforce_http(false);
    http_connector.set_nodelay(true);
    http_connector.set_keepalive(Some(Duration::from_secs(30)));
    http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));

    let tls = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| AgentError::Internal(format!("failed to load native root certificates: {e}")))?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(MAX_IDLE_CONN_DURATION)
        .pool_max_idle_per_host(CONNS_PER_HOST)
        .retry_canceled_requests(true)
        .build(tls))
}
