//! Transport statistics samples and the derived quality snapshot

use crate::domain::shared::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Periodic transport statistics for one session
///
/// Produced by the media stack (RTCP receiver reports, WebRTC `getStats`)
/// and fed to the engine roughly once per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSample {
    pub round_trip_time_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_percent: f64,
    pub bitrate_kbps: f64,
}

impl StatsSample {
    pub fn new(round_trip_time_ms: f64, jitter_ms: f64, packet_loss_percent: f64, bitrate_kbps: f64) -> Self {
        Self {
            round_trip_time_ms,
            jitter_ms,
            packet_loss_percent,
            bitrate_kbps,
        }
    }

    /// Reject negative and non-finite fields
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("roundTripTimeMs", self.round_trip_time_ms),
            ("jitterMs", self.jitter_ms),
            ("packetLossPercent", self.packet_loss_percent),
            ("bitrateKbps", self.bitrate_kbps),
        ];

        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EngineError::InvalidSample(format!("{} is not a finite number", name)));
            }
            if value < 0.0 {
                return Err(EngineError::InvalidSample(format!("{} is negative ({})", name, value)));
            }
        }

        Ok(())
    }
}

/// Quality snapshot for a session, replaced on every sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Mean Opinion Score (1.0 - 5.0)
    pub mos: f64,
    pub round_trip_time_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_percent: f64,
    /// One-way latency estimate, RTT/2 plus device latency
    pub latency_ms: f64,
    pub bitrate_kbps: f64,
    pub sampled_at: DateTime<Utc>,
}

impl QualityMetrics {
    pub fn grade(&self) -> QualityGrade {
        QualityGrade::from_mos(self.mos)
    }

    /// Time since the sample that produced this snapshot
    pub fn staleness(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.sampled_at
    }
}

/// Quality grade categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    /// MOS >= 4.0
    Excellent,
    /// MOS >= 3.5
    Good,
    /// MOS >= 2.5
    Fair,
    /// MOS < 2.5
    Poor,
}

impl QualityGrade {
    pub fn from_mos(mos: f64) -> Self {
        if mos >= 4.0 {
            QualityGrade::Excellent
        } else if mos >= 3.5 {
            QualityGrade::Good
        } else if mos >= 2.5 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QualityGrade::Excellent => "excellent",
            QualityGrade::Good => "good",
            QualityGrade::Fair => "fair",
            QualityGrade::Poor => "poor",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sample() {
        assert!(StatsSample::new(40.0, 5.0, 0.0, 128.0).validate().is_ok());
        assert!(StatsSample::new(0.0, 0.0, 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_negative_sample_rejected() {
        let err = StatsSample::new(40.0, -1.0, 0.0, 128.0).validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidSample(msg) if msg.contains("jitterMs")));
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let sample = StatsSample::new(bad, 5.0, 0.0, 128.0);
            assert!(matches!(sample.validate(), Err(EngineError::InvalidSample(_))));
        }
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(QualityGrade::from_mos(5.0), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_mos(4.0), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_mos(3.99), QualityGrade::Good);
        assert_eq!(QualityGrade::from_mos(3.5), QualityGrade::Good);
        assert_eq!(QualityGrade::from_mos(2.5), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_mos(2.49), QualityGrade::Poor);
        assert_eq!(QualityGrade::from_mos(1.0), QualityGrade::Poor);
    }

    #[test]
    fn test_sample_wire_format() {
        let sample: StatsSample = serde_json::from_str(
            r#"{"roundTripTimeMs":250,"jitterMs":50,"packetLossPercent":2,"bitrateKbps":128}"#,
        )
        .unwrap();
        assert_eq!(sample, StatsSample::new(250.0, 50.0, 2.0, 128.0));
    }
}
