// Simulated settlement: delayed per-transfer timers and synthetic load
pub mod jitter;
pub mod scheduler;
pub mod simulator;

pub use jitter::{FixedJitter, JitterSource, RandomJitter};
pub use scheduler::{SchedulerConfig, SettlementScheduler, ShutdownPolicy};
pub use simulator::LoadSimulator;
