//! Lightweight in-process metrics (dependency-free beyond `dashmap`).
//!
//! Counters and gauges are stored as atomics and rendered in Prometheus text
//! format by the ops `/metrics` handler.

pub mod metrics;

pub use metrics::RelayMetrics;
