//! Application layer - the engine's operations and its background timers

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{EngineStatistics, SampleOutcome, SessionOrchestrator, SweepReport};
pub use scheduler::{Scheduler, SchedulerHandle};
