//! MOS scoring
//!
//! A penalty model over a perfect 5.0: packet loss, then one-way latency,
//! then jitter, then round-trip time, each capped, and the total clamped to
//! the 1.0 - 5.0 MOS range. Two engines scoring the same sample always agree.

use super::metrics::StatsSample;

pub const MOS_MAX: f64 = 5.0;
pub const MOS_MIN: f64 = 1.0;

const LOSS_PENALTY_PER_PERCENT: f64 = 0.5;
const LOSS_PENALTY_CAP: f64 = 2.0;

const LATENCY_THRESHOLD_MS: f64 = 150.0;
const LATENCY_PENALTY_PER_MS: f64 = 0.005;
const LATENCY_PENALTY_CAP: f64 = 1.5;

const JITTER_THRESHOLD_MS: f64 = 30.0;
const JITTER_PENALTY_PER_MS: f64 = 0.02;
const JITTER_PENALTY_CAP: f64 = 1.0;

const RTT_THRESHOLD_MS: f64 = 200.0;
const RTT_PENALTY_PER_MS: f64 = 0.002;
const RTT_PENALTY_CAP: f64 = 1.0;

/// One-way latency estimate: half the round trip plus device-side latency
pub fn estimate_latency_ms(round_trip_time_ms: f64, device_latency_ms: f64) -> f64 {
    round_trip_time_ms / 2.0 + device_latency_ms
}

/// Score a validated sample
pub fn compute_mos(sample: &StatsSample, device_latency_ms: f64) -> f64 {
    let latency_ms = estimate_latency_ms(sample.round_trip_time_ms, device_latency_ms);

    let mut score = MOS_MAX;

    score -= (sample.packet_loss_percent * LOSS_PENALTY_PER_PERCENT).min(LOSS_PENALTY_CAP);

    if latency_ms > LATENCY_THRESHOLD_MS {
        score -= ((latency_ms - LATENCY_THRESHOLD_MS) * LATENCY_PENALTY_PER_MS).min(LATENCY_PENALTY_CAP);
    }

    if sample.jitter_ms > JITTER_THRESHOLD_MS {
        score -= ((sample.jitter_ms - JITTER_THRESHOLD_MS) * JITTER_PENALTY_PER_MS).min(JITTER_PENALTY_CAP);
    }

    if sample.round_trip_time_ms > RTT_THRESHOLD_MS {
        score -= ((sample.round_trip_time_ms - RTT_THRESHOLD_MS) * RTT_PENALTY_PER_MS).min(RTT_PENALTY_CAP);
    }

    // Unvalidated input may still carry NaN
    if score.is_nan() {
        return MOS_MIN;
    }
    score.clamp(MOS_MIN, MOS_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    #[test]
    fn test_perfect_network_scores_five() {
        let sample = StatsSample::new(0.0, 0.0, 0.0, 128.0);
        assert!((compute_mos(&sample, 0.0) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_reference_sample_scores_three_and_a_half() {
        // loss 1.0 + jitter 0.4 + rtt 0.1, latency 125ms below threshold
        let sample = StatsSample::new(250.0, 50.0, 2.0, 128.0);
        assert!((compute_mos(&sample, 0.0) - 3.5).abs() < EPSILON);
    }

    #[test]
    fn test_latency_penalty_uses_device_latency() {
        let sample = StatsSample::new(100.0, 0.0, 0.0, 128.0);
        // latency = 50 + 200 = 250ms -> penalty (100 * 0.005) = 0.5
        assert!((compute_mos(&sample, 200.0) - 4.5).abs() < EPSILON);
        assert!((compute_mos(&sample, 0.0) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_penalties_are_capped() {
        let sample = StatsSample::new(2000.0, 500.0, 50.0, 128.0);
        // loss 2.0 + latency 1.5 + jitter 1.0 + rtt 1.0 = 5.5 -> clamped to 1.0
        assert!((compute_mos(&sample, 0.0) - MOS_MIN).abs() < EPSILON);

        let loss_only = StatsSample::new(0.0, 0.0, 100.0, 128.0);
        assert!((compute_mos(&loss_only, 0.0) - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let sample = StatsSample::new(200.0, 30.0, 0.0, 128.0);
        assert!((compute_mos(&sample, 50.0) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_estimate_latency() {
        assert_eq!(estimate_latency_ms(250.0, 0.0), 125.0);
        assert_eq!(estimate_latency_ms(40.0, 15.0), 35.0);
    }
}
