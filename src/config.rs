use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::network::{ProbeTarget, StrategyKind};
use crate::store::HISTORY_TIMESTAMP_KEY;

/// Top-level configuration structure that mirrors the YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered probe targets; the order is kept in every report
    pub targets: Vec<ProbeTarget>,
    /// Where snapshots, history and text reports are written
    pub paths: PathsConfig,
    /// Settings for the regular diagnostics run
    pub probe: ProbeSettings,
    /// Attempt count used by the `network-test` command
    pub network_test_attempts: u32,
    /// Average latency (ms) above which a target gets a warning line
    pub high_latency_threshold_ms: f64,
    /// DNS servers applied by the DNS mutation
    pub dns_servers: Vec<String>,
    /// Services stopped by the background services mutation
    pub background_services: Vec<String>,
    /// Executables boosted by the process priority mutation
    pub game_processes: Vec<String>,
    /// Continuous monitoring settings
    pub monitor: MonitorConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.targets.is_empty() {
            return Err(ValidationError::InvalidTargets(
                "at least one target is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ValidationError::InvalidTargets(
                    "target name cannot be empty".to_string(),
                ));
            }
            if target.name == HISTORY_TIMESTAMP_KEY {
                return Err(ValidationError::InvalidTargets(format!(
                    "target name '{}' is reserved",
                    target.name
                )));
            }
            if target.host.trim().is_empty() {
                return Err(ValidationError::InvalidTargets(format!(
                    "target '{}' has an empty host",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(ValidationError::InvalidTargets(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
        }

        if self.probe.attempts == 0 || self.network_test_attempts == 0 {
            return Err(ValidationError::InvalidProbe(
                "attempt counts must be at least 1".to_string(),
            ));
        }
        if self.probe.strategies.is_empty() {
            return Err(ValidationError::InvalidProbe(
                "at least one probing strategy is required".to_string(),
            ));
        }
        if self.probe.timeout.is_zero() {
            return Err(ValidationError::InvalidProbe(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if self.monitor.interval.is_zero() {
            return Err(ValidationError::InvalidMonitor(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.monitor.target.trim().is_empty() {
            return Err(ValidationError::InvalidMonitor(
                "target host cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Probe settings for the `network-test` command
    pub fn network_test_settings(&self) -> ProbeSettings {
        ProbeSettings {
            attempts: self.network_test_attempts,
            ..self.probe.clone()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: vec![
                ProbeTarget::new("Valorant EU", "185.40.64.1"),
                ProbeTarget::new("Valorant NA", "192.207.0.1"),
                ProbeTarget::new("CS2 EU West", "146.66.152.12"),
                ProbeTarget::new("Fortnite NA", "199.255.40.175"),
                ProbeTarget::new("League EUW", "104.160.141.3"),
            ],
            paths: PathsConfig::default(),
            probe: ProbeSettings::default(),
            network_test_attempts: 10,
            high_latency_threshold_ms: 60.0,
            dns_servers: vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()],
            background_services: [
                "DiagTrack",
                "SysMain",
                "WSearch",
                "RetailDemo",
                "XboxGipSvc",
                "XblAuthManager",
                "XblGameSave",
                "XboxNetApiSvc",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            game_processes: [
                "cs2.exe",
                "valorant.exe",
                "fortniteclient-win64-shipping.exe",
                "leagueclientux.exe",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Locations of persisted state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub storage_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl PathsConfig {
    /// Snapshot store backing file
    pub fn backup_file(&self) -> PathBuf {
        self.storage_dir.join("system_backup.json")
    }

    /// Append-only network history log
    pub fn network_log(&self) -> PathBuf {
        self.reports_dir.join("network_reports.json")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

/// Per-target probing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Number of sequential measurements per target
    pub attempts: u32,
    /// Pause between two attempts (e.g. "200ms")
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Budget for a single measurement (e.g. "1s")
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// TCP port used by the connect-time strategy
    pub port: u16,
    /// Strategies tried in order on every attempt
    pub strategies: Vec<StrategyKind>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(1),
            port: 443,
            strategies: vec![StrategyKind::TcpConnect, StrategyKind::SystemPing],
        }
    }
}

/// Continuous monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Host pinged on every tick
    pub target: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            target: "1.1.1.1".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid target configuration: {0}")]
    InvalidTargets(String),
    #[error("Invalid probe configuration: {0}")]
    InvalidProbe(String),
    #[error("Invalid monitor configuration: {0}")]
    InvalidMonitor(String),
}
