//! Benchmark challenges and the driver that runs them

pub mod benchmark;
pub mod driver;

pub use benchmark::{Benchmark, BenchmarkError, ChallengeRecord, SkipReason, SkippedChallenge};
pub use driver::{BenchmarkReport, ChallengeDriver, ChallengeOutcome};
