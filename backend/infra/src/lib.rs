//! Infrastructure module for Sudsline.
//!
//! Operational aggregates that back the operator dashboard.

pub mod call_analytics;

pub use call_analytics::CallAnalytics;
