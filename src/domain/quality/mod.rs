//! Quality bounded context - MOS scoring and adaptive bitrate control

pub mod bitrate;
pub mod engine;
pub mod metrics;
pub mod scoring;

pub use bitrate::{adapt_bitrate, BitrateBounds, BitrateChange, BitrateDecision};
pub use engine::{QualityAssessment, QualityEngine};
pub use metrics::{QualityGrade, QualityMetrics, StatsSample};
pub use scoring::{compute_mos, estimate_latency_ms};
