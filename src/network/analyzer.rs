//! Diagnostics run across all configured targets.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_json::{Map, Value};

use super::prober::{ProbeError, Prober};
use super::types::{NetworkResult, ProbeTarget};
use crate::config::ProbeSettings;
use crate::store::{SnapshotStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("No target could be probed: {0}")]
    Transport(#[source] ProbeError),

    #[error("Failed to record network history: {0}")]
    Store(#[from] StoreError),
}

/// Results of one diagnostics run, in the order the targets were given
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub results: Vec<NetworkResult>,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisRun {
    pub fn get(&self, name: &str) -> Option<&NetworkResult> {
        self.results.iter().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Mean of the per-target averages, skipping targets without data
    pub fn mean_latency_ms(&self) -> Option<f64> {
        let latencies: Vec<f64> = self
            .results
            .iter()
            .filter(|r| r.has_data())
            .map(|r| r.average_ms)
            .collect();
        if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        }
    }

    /// `{target name: summary}` as stored in the history log
    pub fn summaries(&self) -> Map<String, Value> {
        self.results
            .iter()
            .map(|r| {
                let summary = serde_json::to_value(r.summary()).unwrap_or(Value::Null);
                (r.name().to_string(), summary)
            })
            .collect()
    }
}

/// Probes every target in turn and records the run in the history log
pub struct NetworkAnalyzer<'a> {
    prober: Prober<'a>,
}

impl<'a> NetworkAnalyzer<'a> {
    pub fn new(prober: Prober<'a>) -> Self {
        Self { prober }
    }

    /// Probe `targets` sequentially and append one history entry.
    ///
    /// A transport failure only marks the affected target; the run fails with
    /// [`AnalyzerError::Transport`] when no target could be probed at all.
    pub fn run_tests(
        &self,
        targets: &[ProbeTarget],
        settings: &ProbeSettings,
        store: &SnapshotStore,
    ) -> Result<AnalysisRun, AnalyzerError> {
        info!(
            "Probing {} target(s): {} attempt(s), {:?} apart, {:?} timeout",
            targets.len(),
            settings.attempts,
            settings.delay,
            settings.timeout
        );

        let mut results = Vec::with_capacity(targets.len());
        let mut last_transport_error = None;

        for target in targets {
            let result = match self
                .prober
                .probe(target, settings.attempts, settings.delay, settings.timeout)
            {
                Ok(result) => result,
                Err(e) => {
                    warn!("Probing {} failed: {}", target.name, e);
                    let result = NetworkResult::unavailable(
                        target.clone(),
                        settings.attempts,
                        e.to_string(),
                    );
                    last_transport_error = Some(e);
                    result
                }
            };

            info!(
                "{}: avg={} loss={:.1}% jitter={} stability={}",
                result.name(),
                result.latency_display(),
                result.packet_loss_pct,
                result.jitter_display(),
                result.stability_score()
            );
            results.push(result);
        }

        let all_unavailable =
            !results.is_empty() && results.iter().all(|r| r.probe_error.is_some());
        if all_unavailable {
            if let Some(e) = last_transport_error {
                return Err(AnalyzerError::Transport(e));
            }
        }

        let mut run = AnalysisRun {
            results,
            timestamp: Utc::now(),
        };
        run.timestamp = store.append_network_report(run.summaries())?;
        Ok(run)
    }
}
