//! Network diagnostics: probing, aggregation and stability scoring.

pub mod analyzer;
pub mod prober;
pub mod stats;
pub mod types;

pub use analyzer::{AnalysisRun, AnalyzerError, NetworkAnalyzer};
pub use prober::{
    ProbeError, ProbeStrategy, Prober, StrategyKind, SystemPingStrategy, TcpConnectStrategy,
};
pub use stats::{aggregate, stability_score, Aggregate};
pub use types::{NetworkResult, ProbeTarget, StabilityScore, TargetSummary};
