#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod orchestration;
pub mod run;
pub mod shutdown;
