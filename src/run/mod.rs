// Package run provides typed access to a run resource on the orchestration server.

pub mod client;
pub mod document;
pub mod keys;
pub mod node;


pub use client::RunClient;
pub use document::{ImageTargets, RunDocument, Target};
pub use node::{NodeInstance, ScaleState};
