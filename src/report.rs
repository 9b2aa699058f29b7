//! Human-readable report sections.
//!
//! Pure formatting: every function takes results and returns text, the
//! orchestrator decides what to print and export.

use crate::mutation::ActionOutcome;
use crate::network::NetworkResult;
use crate::perf::PerformanceMetrics;

const WARNING_INDENT: &str = "      ";

/// `[NETWORK ANALYSIS]` with one line per target plus warnings
pub fn network_section(results: &[NetworkResult], high_latency_threshold_ms: f64) -> String {
    let mut lines: Vec<String> = vec!["[NETWORK ANALYSIS]".to_string()];

    for result in results {
        lines.push(format!(
            "{:<20} Ping: {} | Loss: {:.1}% | Jitter: {} | Stability: {}",
            result.name(),
            result.latency_display(),
            result.packet_loss_pct,
            result.jitter_display(),
            result.stability_score().stars()
        ));

        if let Some(ref error) = result.probe_error {
            lines.push(format!("{}⚠ Probe unavailable: {}", WARNING_INDENT, error));
        } else if !result.has_data() {
            lines.push(format!(
                "{}⚠ No reply received (server may filter ICMP or be unreachable).",
                WARNING_INDENT
            ));
        } else if result.average_ms > high_latency_threshold_ms {
            lines.push(format!(
                "{}⚠ High latency detected, check your connection.",
                WARNING_INDENT
            ));
        }
    }

    lines.join("\n")
}

/// Outcome list under `title`, e.g. `[SYSTEM OPTIMIZATIONS]` or `[RESTORE]`
pub fn mutation_section(title: &str, outcomes: &[ActionOutcome]) -> String {
    let mut lines = vec![title.to_string()];
    lines.extend(outcomes.iter().map(|o| format!(" - {}", o.message)));
    lines.join("\n")
}

/// `[PERFORMANCE GAINS]` comparing a baseline with the current sample
pub fn performance_section(
    before: Option<&PerformanceMetrics>,
    after: &PerformanceMetrics,
) -> String {
    let mut lines = vec!["[PERFORMANCE GAINS]".to_string()];

    if let Some(before) = before {
        if before.fps_estimate != 0.0 {
            let pct = (after.fps_estimate - before.fps_estimate) / before.fps_estimate * 100.0;
            lines.push(format!(
                "Average FPS: {:.0} → {:.0} ({:+.1}%)",
                before.fps_estimate, after.fps_estimate, pct
            ));
        }

        if before.mean_latency_ms > 0.0 && after.mean_latency_ms > 0.0 {
            let delta = after.mean_latency_ms - before.mean_latency_ms;
            let pct = delta / before.mean_latency_ms * 100.0;
            lines.push(format!(
                "Latency: {:.0}ms → {:.0}ms ({:+.1}%)",
                before.mean_latency_ms, after.mean_latency_ms, pct
            ));
        }
    }

    if lines.len() == 1 {
        lines.push("Collect metrics before and after optimizing to see the gains.".to_string());
    }

    lines.join("\n")
}

/// Sections separated by a blank line
pub fn join_sections<S: AsRef<str>>(sections: &[S]) -> String {
    sections
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
