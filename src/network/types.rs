//! Core data types for network diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::stats::{self, round2};

/// A named remote host measured for latency, loss and jitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub name: String,
    pub host: String,
}

impl ProbeTarget {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
        }
    }
}

/// Link quality on a 1 (worst) to 5 (best) scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StabilityScore(u8);

impl StabilityScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Clamps into `[MIN, MAX]`
    pub fn new(score: u8) -> Self {
        Self(score.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Five-slot star scale, e.g. `★★★☆☆`
    pub fn stars(self) -> String {
        let filled = self.0 as usize;
        let empty = (Self::MAX - self.0) as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }
}

impl fmt::Display for StabilityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// Outcome of probing one target during one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResult {
    pub target: ProbeTarget,
    /// Successful round-trip times in ms, in measurement order
    pub samples: Vec<f64>,
    pub attempts: u32,
    pub timeouts: u32,
    pub packet_loss_pct: f64,
    pub jitter_ms: f64,
    /// `f64::INFINITY` when `samples` is empty; check [`has_data`](Self::has_data) first
    pub average_ms: f64,
    /// Set when the probing transport itself was unusable for this target
    pub probe_error: Option<String>,
}

impl NetworkResult {
    /// Build a result from the successful samples of `attempts` attempts
    pub fn from_samples(target: ProbeTarget, samples: Vec<f64>, attempts: u32) -> Self {
        let agg = stats::aggregate(&samples, attempts);
        let timeouts = attempts.saturating_sub(samples.len() as u32);
        Self {
            target,
            samples,
            attempts,
            timeouts,
            packet_loss_pct: agg.packet_loss_pct,
            jitter_ms: agg.jitter_ms,
            average_ms: agg.average_ms,
            probe_error: None,
        }
    }

    /// Result for a target whose transport failed: every attempt counts as lost
    pub fn unavailable(target: ProbeTarget, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            probe_error: Some(error.into()),
            ..Self::from_samples(target, Vec::new(), attempts)
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn has_data(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn stability_score(&self) -> StabilityScore {
        stats::stability_score(self.average_ms, self.packet_loss_pct, self.jitter_ms)
    }

    pub fn latency_display(&self) -> String {
        if self.has_data() {
            format!("{:.1} ms", self.average_ms)
        } else {
            "timeout".to_string()
        }
    }

    pub fn jitter_display(&self) -> String {
        if self.has_data() {
            format!("{:.1} ms", self.jitter_ms)
        } else {
            "n/a".to_string()
        }
    }

    /// Compact form persisted in the history log and analysis snapshot
    pub fn summary(&self) -> TargetSummary {
        TargetSummary {
            host: self.target.host.clone(),
            avg: self.has_data().then(|| round2(self.average_ms)),
            loss: self.packet_loss_pct,
            jitter: round2(self.jitter_ms),
            stability: self.stability_score().value(),
        }
    }
}

/// Per-target entry of a history report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub host: String,
    /// `null` when the target produced no sample
    pub avg: Option<f64>,
    pub loss: f64,
    pub jitter: f64,
    pub stability: u8,
}
