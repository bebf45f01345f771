/*
[INPUT]:  Public API exports for binance-stream-runner crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod metrics;
pub mod server;
pub mod service;
pub mod stress;

// Re-export main types for convenience
pub use config::{AppConfig, Environment};
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
pub use server::StatusState;
pub use service::{MarketDataService, ServiceExit, check_server_clock};
pub use stress::{StressConfig, StressReport, run_stress};
