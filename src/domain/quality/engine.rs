//! Quality metrics engine
//!
//! Stateless: everything it needs arrives with the call, so it can run on any
//! worker without synchronization. Only the write-back into the session needs
//! the session's lock.

use super::bitrate::{adapt_bitrate, BitrateBounds, BitrateDecision};
use super::metrics::{QualityMetrics, StatsSample};
use super::scoring::{compute_mos, estimate_latency_ms};
use crate::domain::shared::Result;
use chrono::{DateTime, Utc};

/// Output of evaluating one sample
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAssessment {
    pub metrics: QualityMetrics,
    pub bitrate: BitrateDecision,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityEngine {
    device_latency_ms: f64,
    bounds: BitrateBounds,
}

impl Default for QualityEngine {
    fn default() -> Self {
        Self::new(0.0, BitrateBounds::default())
    }
}

impl QualityEngine {
    pub fn new(device_latency_ms: f64, bounds: BitrateBounds) -> Self {
        Self {
            device_latency_ms,
            bounds,
        }
    }

    /// Score `sample` and step the bitrate controller from `current_bitrate_kbps`.
    pub fn evaluate(
        &self,
        sample: &StatsSample,
        current_bitrate_kbps: u32,
        sampled_at: DateTime<Utc>,
    ) -> Result<QualityAssessment> {
        sample.validate()?;

        let metrics = QualityMetrics {
            mos: compute_mos(sample, self.device_latency_ms),
            round_trip_time_ms: sample.round_trip_time_ms,
            jitter_ms: sample.jitter_ms,
            packet_loss_percent: sample.packet_loss_percent,
            latency_ms: estimate_latency_ms(sample.round_trip_time_ms, self.device_latency_ms),
            bitrate_kbps: sample.bitrate_kbps,
            sampled_at,
        };

        let bitrate = adapt_bitrate(current_bitrate_kbps, sample, &self.bounds);

        Ok(QualityAssessment { metrics, bitrate })
    }
}
