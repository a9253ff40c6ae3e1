//! Observability (metrics).

pub mod metrics;

pub use metrics::RpcMetrics;
