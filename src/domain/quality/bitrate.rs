//! Adaptive audio bitrate control

use super::metrics::StatsSample;
use crate::domain::shared::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Packet loss above which the target drops by two steps
const HEAVY_LOSS_PERCENT: f64 = 1.0;
/// Round-trip time above which the target drops by one step
const HIGH_RTT_MS: f64 = 200.0;
/// Both must hold for the target to climb
const CLEAN_LOSS_PERCENT: f64 = 0.1;
const CLEAN_RTT_MS: f64 = 100.0;

/// Bitrate bounds and step size, in kbps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateBounds {
    pub min: u32,
    pub max: u32,
    pub step: u32,
    /// Starting target for new sessions
    pub initial: u32,
}

impl Default for BitrateBounds {
    fn default() -> Self {
        Self {
            min: 64,
            max: 320,
            step: 16,
            initial: 128,
        }
    }
}

impl BitrateBounds {
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(EngineError::Config("bitrate step must be positive".to_string()));
        }
        if self.min > self.max {
            return Err(EngineError::Config(format!(
                "bitrate min {} exceeds max {}",
                self.min, self.max
            )));
        }
        if self.initial < self.min || self.initial > self.max {
            return Err(EngineError::Config(format!(
                "initial bitrate {} outside [{}, {}]",
                self.initial, self.min, self.max
            )));
        }
        Ok(())
    }

    fn clamp(&self, kbps: u32) -> u32 {
        kbps.clamp(self.min, self.max)
    }
}

/// Result of one control step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateDecision {
    pub previous_kbps: u32,
    /// Target the controller asked for before anti-thrash filtering
    pub proposed_kbps: u32,
    /// Target in effect after this sample
    pub target_kbps: u32,
}

impl BitrateDecision {
    /// Whether the transport must be reconfigured
    pub fn is_applied(&self) -> bool {
        self.target_kbps != self.previous_kbps
    }

    pub fn change(&self) -> Option<BitrateChange> {
        self.is_applied().then(|| BitrateChange {
            old_bitrate_kbps: self.previous_kbps,
            new_bitrate_kbps: self.target_kbps,
        })
    }
}

/// Actionable bitrate change reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitrateChange {
    pub old_bitrate_kbps: u32,
    pub new_bitrate_kbps: u32,
}

impl BitrateChange {
    pub fn direction(&self) -> &'static str {
        if self.new_bitrate_kbps > self.old_bitrate_kbps {
            "up"
        } else {
            "down"
        }
    }
}

/// Compute the next bitrate target from the current one and a validated sample.
///
/// Moves shorter than one full step (possible when a bound is not aligned to
/// the step grid) are absorbed and leave the target unchanged.
pub fn adapt_bitrate(current_kbps: u32, sample: &StatsSample, bounds: &BitrateBounds) -> BitrateDecision {
    let step = bounds.step;

    let proposed = if sample.packet_loss_percent > HEAVY_LOSS_PERCENT {
        current_kbps.saturating_sub(2 * step).max(bounds.min)
    } else if sample.round_trip_time_ms > HIGH_RTT_MS {
        current_kbps.saturating_sub(step).max(bounds.min)
    } else if sample.packet_loss_percent < CLEAN_LOSS_PERCENT && sample.round_trip_time_ms < CLEAN_RTT_MS {
        current_kbps.saturating_add(step).min(bounds.max)
    } else {
        current_kbps
    };
    let proposed = bounds.clamp(proposed);

    let target = if proposed.abs_diff(current_kbps) >= step {
        proposed
    } else {
        current_kbps
    };

    BitrateDecision {
        previous_kbps: current_kbps,
        proposed_kbps: proposed,
        target_kbps: target,
    }
}
