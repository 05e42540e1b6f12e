//! Lightweight in-process metrics.
//!
//! Counters and gauges are atomics rendered in Prometheus text format by the
//! `/metrics` handler.

pub mod metrics;

pub use metrics::GatewayMetrics;
