//! Live latency and resource readout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use sysinfo::System;

use crate::network::Prober;

/// Longest uninterrupted sleep, so Ctrl-C is honoured promptly
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// One reading of the monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSample {
    pub latency_ms: Option<f64>,
    pub cpu_pct: f32,
    pub ram_pct: f64,
}

/// Prints one line per tick until stopped. Never touches the snapshot store.
pub struct RealTimeMonitor<'a> {
    prober: Prober<'a>,
    target: String,
    timeout: Duration,
    system: System,
}

impl<'a> RealTimeMonitor<'a> {
    pub fn new(prober: Prober<'a>, target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prober,
            target: target.into(),
            timeout,
            system: System::new(),
        }
    }

    pub fn sample(&mut self) -> MonitorSample {
        let latency_ms = match self.prober.measure_once(&self.target, self.timeout) {
            Ok(latency) => latency,
            Err(e) => {
                debug!("Monitor probe failed: {}", e);
                None
            }
        };

        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let ram_pct = if total == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total as f64 * 100.0
        };

        MonitorSample {
            latency_ms,
            cpu_pct: self.system.global_cpu_usage(),
            ram_pct,
        }
    }

    pub fn format_sample(&self, sample: &MonitorSample) -> String {
        let latency = match sample.latency_ms {
            Some(ms) => format!("{:.1} ms", ms),
            None => "timeout".to_string(),
        };
        format!(
            "Ping {}: {} | CPU: {:.1}% | RAM: {:.1}%",
            self.target, latency, sample.cpu_pct, sample.ram_pct
        )
    }

    /// Tick every `interval` while `running` holds, at most `max_ticks` times.
    /// Returns the number of ticks printed.
    pub fn run(&mut self, interval: Duration, running: &AtomicBool, max_ticks: Option<u64>) -> u64 {
        println!("[REAL-TIME MONITOR] Ctrl+C to quit.");
        info!("Monitoring {} every {:?}", self.target, interval);

        let mut ticks = 0;
        while running.load(Ordering::SeqCst) {
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            let sample = self.sample();
            println!("{}", self.format_sample(&sample));
            ticks += 1;

            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            sleep_while_running(interval, running);
        }

        if !running.load(Ordering::SeqCst) {
            println!("\nMonitoring stopped.");
        }
        ticks
    }
}

fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
