//! Integration tests for the run agent.
//!
//! These tests drive the transport and the full lifecycle against a fake
//! orchestration server.


pub mod support;
