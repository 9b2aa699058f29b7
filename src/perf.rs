//! Before/after performance sampling.
//!
//! The FPS figure is a relative throughput estimate from a CPU-bound loop,
//! only meaningful when compared against another sample from the same host.

use std::hint::black_box;
use std::time::Instant;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::network::stats::round2;
use crate::network::AnalysisRun;

/// Loop iterations used by the commands
pub const DEFAULT_BENCH_ITERATIONS: u64 = 2_000_000;

/// Iterations per second that map to one pseudo frame
const ITERATIONS_PER_FRAME: f64 = 50_000.0;

/// Snapshot of system responsiveness, stored as `performance_before`/`performance_after`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(rename = "fps")]
    pub fps_estimate: f64,
    /// Mean latency over reachable targets, `0.0` when none answered
    #[serde(rename = "latency")]
    pub mean_latency_ms: f64,
}

/// Pseudo-FPS from the throughput of a tight integer loop
pub fn synthetic_benchmark(iterations: u64) -> f64 {
    let start = Instant::now();
    let mut acc: u64 = 0;
    for i in 0..iterations {
        acc = black_box(acc.wrapping_add(i.wrapping_mul(i)));
    }
    black_box(acc);

    let secs = start.elapsed().as_secs_f64().max(f64::EPSILON);
    let fps = round2(iterations as f64 / secs / ITERATIONS_PER_FRAME);
    debug!("Benchmark: {} iterations in {:.4}s -> {} fps", iterations, secs, fps);
    fps
}

pub fn collect_performance_metrics(
    run: Option<&AnalysisRun>,
    iterations: u64,
) -> PerformanceMetrics {
    PerformanceMetrics {
        fps_estimate: synthetic_benchmark(iterations),
        mean_latency_ms: run.and_then(AnalysisRun::mean_latency_ms).unwrap_or(0.0),
    }
}
