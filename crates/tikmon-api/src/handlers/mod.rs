//! HTTP handlers

pub mod discover;
pub mod metrics;
pub mod reload;
