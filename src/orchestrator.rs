//! Command orchestration.
//!
//! This module wires configuration, the snapshot store, the prober and the
//! mutation actions together into the user-facing commands. Every command
//! returns the report text it produced, together with the exported file when
//! there is one.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use log::info;
use serde_json::json;

use crate::config::{Config, ProbeSettings};
use crate::monitor::RealTimeMonitor;
use crate::mutation::{default_actions, MutationAction, MutationContext, MutationRunner};
use crate::network::{AnalysisRun, NetworkAnalyzer, Prober};
use crate::perf::{collect_performance_metrics, PerformanceMetrics, DEFAULT_BENCH_ITERATIONS};
use crate::report::{join_sections, mutation_section, network_section, performance_section};
use crate::store::{SnapshotStore, StoreError};
use crate::utils::command::CommandRunner;

/// Snapshot keys owned by the commands rather than by a mutation action
pub const ANALYSIS_LAST_KEY: &str = "analysis_last";
pub const PERFORMANCE_BEFORE_KEY: &str = "performance_before";
pub const PERFORMANCE_AFTER_KEY: &str = "performance_after";

/// Text produced by a command
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub text: String,
    /// Exported report file, if the command writes one
    pub path: Option<PathBuf>,
}

pub struct Optimizer {
    config: Config,
    store: SnapshotStore,
    runner: Box<dyn CommandRunner>,
    actions: Vec<Box<dyn MutationAction>>,
    bench_iterations: u64,
}

impl Optimizer {
    /// Open the store under the configured paths with the default action list
    pub fn new(config: Config, runner: Box<dyn CommandRunner>) -> Result<Self, StoreError> {
        let store = SnapshotStore::open(&config.paths)?;
        let actions = default_actions(&config);
        Ok(Self {
            config,
            store,
            runner,
            actions,
            bench_iterations: DEFAULT_BENCH_ITERATIONS,
        })
    }

    pub fn with_actions(mut self, actions: Vec<Box<dyn MutationAction>>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_benchmark_iterations(mut self, iterations: u64) -> Self {
        self.bench_iterations = iterations;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn prober(&self, settings: &ProbeSettings) -> Prober<'_> {
        Prober::from_kinds(&settings.strategies, &*self.runner, settings.port)
    }

    fn run_network_tests(&self, settings: &ProbeSettings) -> Result<AnalysisRun> {
        NetworkAnalyzer::new(self.prober(settings))
            .run_tests(&self.config.targets, settings, &self.store)
            .wrap_err("Network diagnostics failed")
    }

    fn export(&self, name: &str, text: String) -> Result<CommandReport> {
        let path = self
            .store
            .export_report_text(name, &text)
            .wrap_err_with(|| format!("Failed to export the {} report", name))?;
        Ok(CommandReport {
            text,
            path: Some(path),
        })
    }

    /// Diagnose the network and record the performance baseline
    pub fn analyze(&mut self) -> Result<CommandReport> {
        info!("Running analysis");
        let run = self.run_network_tests(&self.config.probe)?;
        let perf = collect_performance_metrics(Some(&run), self.bench_iterations);

        self.store
            .set(
                ANALYSIS_LAST_KEY,
                &json!({ "network": run.summaries(), "perf": perf }),
            )
            .wrap_err("Failed to save the analysis snapshot")?;
        self.store
            .set(PERFORMANCE_BEFORE_KEY, &perf)
            .wrap_err("Failed to save the performance baseline")?;

        let text = join_sections(&[
            network_section(&run.results, self.config.high_latency_threshold_ms),
            performance_section(None, &perf),
        ]);
        self.export("analysis", text)
    }

    /// Apply every action, then measure again and compare with the baseline
    pub fn optimize(&mut self) -> Result<CommandReport> {
        info!("Applying {} optimization(s)", self.actions.len());
        let outcomes = {
            let mut ctx = MutationContext::new(&mut self.store, &*self.runner);
            MutationRunner::apply_all(&self.actions, &mut ctx)
                .wrap_err("Failed to persist a snapshot, optimization aborted")?
        };
        let applied = outcomes.iter().filter(|o| o.succeeded).count();
        info!("{}/{} optimization(s) applied", applied, outcomes.len());

        let run = self.run_network_tests(&self.config.probe)?;
        let before: Option<PerformanceMetrics> = self.store.get_as(PERFORMANCE_BEFORE_KEY);
        let after = collect_performance_metrics(Some(&run), self.bench_iterations);
        self.store
            .set(PERFORMANCE_AFTER_KEY, &after)
            .wrap_err("Failed to save post-optimization metrics")?;

        let text = join_sections(&[
            mutation_section("[SYSTEM OPTIMIZATIONS]", &outcomes),
            network_section(&run.results, self.config.high_latency_threshold_ms),
            performance_section(before.as_ref(), &after),
        ]);
        self.export("optimize", text)
    }

    /// Longer diagnostics run; no snapshot is taken
    pub fn network_test(&mut self) -> Result<CommandReport> {
        let settings = self.config.network_test_settings();
        info!("Running network test with {} attempt(s) per target", settings.attempts);
        let run = self.run_network_tests(&settings)?;

        let text = network_section(&run.results, self.config.high_latency_threshold_ms);
        self.export("network_test", text)
    }

    /// Reverse every action from its persisted snapshot
    pub fn restore(&mut self) -> Result<CommandReport> {
        info!("Restoring from {}", self.store.backup_path().display());
        let outcomes = {
            let mut ctx = MutationContext::new(&mut self.store, &*self.runner);
            MutationRunner::restore_all(&self.actions, &mut ctx).wrap_err("Restore aborted")?
        };

        let text = mutation_section("[RESTORE]", &outcomes);
        self.export("restore", text)
    }

    /// Live readout until `running` is cleared; returns the ticks printed
    pub fn monitor(
        &self,
        interval: Option<Duration>,
        running: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> u64 {
        let interval = interval.unwrap_or(self.config.monitor.interval);
        let mut monitor = RealTimeMonitor::new(
            self.prober(&self.config.probe),
            self.config.monitor.target.clone(),
            self.config.probe.timeout,
        );
        monitor.run(interval, running, max_ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::network::{ProbeTarget, StrategyKind};
    use crate::utils::command::CommandOutput;
    use std::io;
    use tempfile::TempDir;

    /// Ping answers with a fixed time, every other tool succeeds silently
    struct FakeSystem;

    impl CommandRunner for FakeSystem {
        fn run(&self, program: &str, _args: &[&str]) -> io::Result<CommandOutput> {
            match program {
                "ping" => Ok(CommandOutput::ok("Reply from 1.2.3.4: bytes=32 time=20ms TTL=57")),
                "powercfg" => Ok(CommandOutput::ok(
                    "Power Scheme GUID: 381b4222-f694-41f0-9685-ff5bb260df2e  (Balanced)",
                )),
                _ => Ok(CommandOutput::ok("")),
            }
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config {
            targets: vec![ProbeTarget::new("A", "a.example"), ProbeTarget::new("B", "b.example")],
            paths: PathsConfig {
                storage_dir: dir.path().join("storage"),
                reports_dir: dir.path().join("reports"),
            },
            ..Config::default()
        };
        config.probe.attempts = 2;
        config.probe.delay = Duration::ZERO;
        config.probe.strategies = vec![StrategyKind::SystemPing];
        config.network_test_attempts = 3;
        config
    }

    fn optimizer(dir: &TempDir) -> Optimizer {
        Optimizer::new(config(dir), Box::new(FakeSystem))
            .unwrap()
            .with_benchmark_iterations(1_000)
    }

    #[test]
    fn test_analyze_records_baseline_and_exports() {
        let dir = TempDir::new().unwrap();
        let mut optimizer = optimizer(&dir);

        let report = optimizer.analyze().unwrap();
        assert!(report.text.starts_with("[NETWORK ANALYSIS]"));
        assert!(report.text.contains("[PERFORMANCE GAINS]"));

        let path = report.path.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("analysis_"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), report.text);

        let baseline: PerformanceMetrics =
            optimizer.store().get_as(PERFORMANCE_BEFORE_KEY).unwrap();
        assert_eq!(baseline.mean_latency_ms, 20.0);
        assert_eq!(
            optimizer.store().get(ANALYSIS_LAST_KEY).unwrap()["network"]["A"]["avg"],
            20.0
        );
        assert_eq!(optimizer.store().network_reports().unwrap().len(), 1);
    }

    #[test]
    fn test_optimize_then_restore() {
        let dir = TempDir::new().unwrap();
        let mut optimizer = optimizer(&dir);
        optimizer.analyze().unwrap();

        let report = optimizer.optimize().unwrap();
        assert!(report.text.starts_with("[SYSTEM OPTIMIZATIONS]"));
        assert!(report.text.contains(" - Power plan: power plan set to maximum performance"));
        assert!(report.text.contains("Latency: 20ms → 20ms (+0.0%)"));
        assert!(optimizer.store().contains("power_plan"));
        assert!(optimizer.store().contains(PERFORMANCE_AFTER_KEY));

        let restored = optimizer.restore().unwrap();
        assert!(restored.text.starts_with("[RESTORE]"));
        assert!(restored
            .text
            .contains("Power plan: power plan 381b4222-f694-41f0-9685-ff5bb260df2e restored"));
    }

    #[test]
    fn test_network_test_uses_longer_run() {
        let dir = TempDir::new().unwrap();
        let mut optimizer = optimizer(&dir);

        let report = optimizer.network_test().unwrap();
        assert!(!report.text.contains("[PERFORMANCE GAINS]"));
        let history = optimizer.store().network_reports().unwrap();
        assert_eq!(history.len(), 1);
        assert!(!optimizer.store().contains(PERFORMANCE_BEFORE_KEY));
    }

    #[test]
    fn test_restore_before_optimize_needs_manual_recovery() {
        let dir = TempDir::new().unwrap();
        let mut optimizer = optimizer(&dir);

        let report = optimizer.restore().unwrap();
        assert_eq!(
            report.text.matches("no backup found, manual recovery required").count(),
            6
        );
    }
}
