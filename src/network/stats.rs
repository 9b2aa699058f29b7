//! Aggregate statistics and stability scoring for latency samples.

use super::types::StabilityScore;

/// Aggregated view of one target's samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Mean latency, `f64::INFINITY` when no sample was collected
    pub average_ms: f64,
    /// Population standard deviation, `0.0` with fewer than two samples
    pub jitter_ms: f64,
    /// Share of attempts without a measurement, rounded to 2 decimals
    pub packet_loss_pct: f64,
}

/// One row of the stability table. `None` bounds are not checked.
struct Tier {
    score: u8,
    max_average_ms: f64,
    max_loss_pct: Option<f64>,
    max_jitter_ms: Option<f64>,
}

/// Evaluated top to bottom, the first matching tier wins.
/// Columns: score, max average ms, loss % bound, jitter ms bound.
const TIERS: [Tier; 4] = [
    Tier::new(5, 30.0, Some(0.5), Some(3.0)),
    Tier::new(4, 45.0, Some(1.0), Some(6.0)),
    Tier::new(3, 60.0, Some(2.0), None),
    Tier::new(2, 90.0, None, None),
];

impl Tier {
    const fn new(
        score: u8,
        max_average_ms: f64,
        max_loss_pct: Option<f64>,
        max_jitter_ms: Option<f64>,
    ) -> Self {
        Self {
            score,
            max_average_ms,
            max_loss_pct,
            max_jitter_ms,
        }
    }

    fn matches(&self, average_ms: f64, loss_pct: f64, jitter_ms: f64) -> bool {
        average_ms <= self.max_average_ms
            && self.max_loss_pct.map_or(true, |max| loss_pct < max)
            && self.max_jitter_ms.map_or(true, |max| jitter_ms < max)
    }
}

/// Aggregate the successful samples of `attempts` probe attempts
pub fn aggregate(samples: &[f64], attempts: u32) -> Aggregate {
    Aggregate {
        average_ms: mean(samples),
        jitter_ms: population_stddev(samples),
        packet_loss_pct: packet_loss_pct(attempts, samples.len()),
    }
}

/// Arithmetic mean, `+∞` for an empty slice
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::INFINITY;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Population standard deviation, `0.0` with fewer than two samples
pub fn population_stddev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let avg = mean(samples);
    let variance = samples
        .iter()
        .map(|&ms| {
            let diff = ms - avg;
            diff * diff
        })
        .sum::<f64>()
        / samples.len() as f64;
    variance.sqrt()
}

/// `(attempts - received) / attempts * 100`, rounded to 2 decimals
pub fn packet_loss_pct(attempts: u32, received: usize) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    let received = received.min(attempts as usize) as f64;
    let dropped = attempts as f64 - received;
    round2(dropped / attempts as f64 * 100.0)
}

/// Map link metrics to a 1-5 score
pub fn stability_score(average_ms: f64, packet_loss_pct: f64, jitter_ms: f64) -> StabilityScore {
    let score = TIERS
        .iter()
        .find(|tier| tier.matches(average_ms, packet_loss_pct, jitter_ms))
        .map_or(StabilityScore::MIN, |tier| tier.score);
    StabilityScore::new(score)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_empty_mean() {
        assert_eq!(mean(&[10.0, 20.0, 30.0]), 20.0);
        assert!(mean(&[]).is_infinite());
    }

    #[test]
    fn test_population_stddev() {
        // Classic example: population stddev of this set is exactly 2
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_stddev(&samples) - 2.0).abs() < 1e-9);

        assert_eq!(population_stddev(&[]), 0.0);
        assert_eq!(population_stddev(&[42.0]), 0.0);
        assert_eq!(population_stddev(&[15.0, 15.0, 15.0]), 0.0);
    }

    #[test]
    fn test_jitter_never_negative() {
        let sets: [&[f64]; 4] = [
            &[1.0, 1000.0],
            &[0.0, 0.0],
            &[3.3, 7.1, 2.2],
            &[99.0, 1.0, 50.0, 25.0],
        ];
        for set in sets {
            assert!(population_stddev(set) >= 0.0);
        }
    }

    #[test]
    fn test_packet_loss_bounds() {
        for attempts in 1..=12u32 {
            for received in 0..=attempts as usize {
                let loss = packet_loss_pct(attempts, received);
                assert!((0.0..=100.0).contains(&loss), "loss {} out of range", loss);
                let lost = attempts as f64 - received as f64;
                let expected = round2(lost / attempts as f64 * 100.0);
                assert_eq!(loss, expected);
            }
        }
        assert_eq!(packet_loss_pct(3, 2), 33.33);
        assert_eq!(packet_loss_pct(5, 0), 100.0);
        assert_eq!(packet_loss_pct(0, 0), 0.0);
    }

    #[test]
    fn test_aggregate() {
        let agg = aggregate(&[20.0, 30.0], 4);
        assert_eq!(agg.average_ms, 25.0);
        assert_eq!(agg.jitter_ms, 5.0);
        assert_eq!(agg.packet_loss_pct, 50.0);

        let empty = aggregate(&[], 5);
        assert!(empty.average_ms.is_infinite());
        assert_eq!(empty.jitter_ms, 0.0);
        assert_eq!(empty.packet_loss_pct, 100.0);
    }

    #[test]
    fn test_stability_tiers() {
        assert_eq!(stability_score(20.0, 0.0, 1.0).value(), 5);
        assert_eq!(stability_score(30.0, 0.4, 2.9).value(), 5);
        assert_eq!(stability_score(40.0, 0.5, 5.0).value(), 4);
        assert_eq!(stability_score(55.0, 1.5, 40.0).value(), 3);
        assert_eq!(stability_score(85.0, 50.0, 40.0).value(), 2);
        assert_eq!(stability_score(90.1, 0.0, 0.0).value(), 1);
    }

    #[test]
    fn test_loss_failure_falls_through_to_next_satisfied_tier() {
        // Fails 5, 4 and 3 on loss only, passes tier 2 on latency
        assert_eq!(stability_score(25.0, 40.0, 1.0).value(), 2);
        // Fails 5 on jitter, lands on 4
        assert_eq!(stability_score(25.0, 0.0, 4.0).value(), 4);
    }

    #[test]
    fn test_no_samples_scores_one() {
        let agg = aggregate(&[], 5);
        assert_eq!(
            stability_score(agg.average_ms, agg.packet_loss_pct, agg.jitter_ms).value(),
            1
        );
    }
}
