//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orchestrate;
pub mod orders;
pub mod sales;
