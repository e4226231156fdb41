// HTTP client: hyper pool, single exchanges, status mapping and the retrying transport.

pub mod hyper_client;
pub mod request;
pub mod retry;
pub mod status;
pub mod transport;

#[cfg(test)]
mod retry_test;

pub use hyper_client::{create_client, HyperClient};
pub use request::Response;
pub use retry::{RateLimitCounter, RetryPolicy};
pub use transport::{CallOptions, Credentials, Transport, TransportContext};
