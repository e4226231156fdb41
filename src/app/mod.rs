// Package app wires configuration, transport, run client and lifecycle together.

#[allow(clippy::module_inception)]
mod app;

pub use app::App;
