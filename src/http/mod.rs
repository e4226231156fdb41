// HTTP module: client transport and the persistent cookie session.

pub mod client;
pub mod session;

pub use client::{CallOptions, Transport};
