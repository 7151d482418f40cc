//! Prometheus metrics for benchmark runs
//!
//! All metrics live in the default registry. [`gather_text`] renders them in
//! the text exposition format so a run can dump them to a file at exit.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Challenge Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Challenges finished, by outcome.
    ///
    /// Labels:
    /// - outcome: "solved", "exhausted", "failed" or "skipped"
    pub static ref CHALLENGES: CounterVec = register_counter_vec!(
        "flagseeker_challenges_total",
        "Challenges finished by outcome",
        &["outcome"]
    ).expect("failed to register CHALLENGES metric");

    /// Cycles used per challenge attempt.
    pub static ref STEPS_PER_CHALLENGE: Histogram = register_histogram!(
        "flagseeker_steps_per_challenge",
        "Plan/execute/summarize cycles used per challenge",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]
    ).expect("failed to register STEPS_PER_CHALLENGE metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Loop Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Plan/execute/summarize cycles run.
    pub static ref AGENT_CYCLES: Counter = register_counter!(
        "flagseeker_agent_cycles_total",
        "Agent loop cycles run"
    ).expect("failed to register AGENT_CYCLES metric");

    /// Cycles whose command could not be run.
    ///
    /// Labels:
    /// - kind: "no_command" (nothing extracted) or "sandbox" (execution failed)
    pub static ref COMMAND_ERRORS: CounterVec = register_counter_vec!(
        "flagseeker_command_errors_total",
        "Cycles without a usable command result",
        &["kind"]
    ).expect("failed to register COMMAND_ERRORS metric");

    /// Observations cut down to the configured length limit.
    pub static ref OBSERVATIONS_TRUNCATED: Counter = register_counter!(
        "flagseeker_observations_truncated_total",
        "Observations truncated to the length limit"
    ).expect("failed to register OBSERVATIONS_TRUNCATED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Model Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tokens consumed and produced.
    ///
    /// Labels:
    /// - role: "planner" or "summarizer"
    /// - direction: "input" or "output"
    pub static ref TOKENS: CounterVec = register_counter_vec!(
        "flagseeker_tokens_total",
        "Model tokens by role and direction",
        &["role", "direction"]
    ).expect("failed to register TOKENS metric");

    /// Wall-clock time of model calls in seconds.
    pub static ref LLM_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "flagseeker_llm_call_duration_seconds",
        "Duration of text generation calls",
        &["role"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).expect("failed to register LLM_CALL_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Sandbox Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Wall-clock time of sandbox command executions in seconds.
    pub static ref SANDBOX_EXEC_DURATION: Histogram = register_histogram!(
        "flagseeker_sandbox_exec_duration_seconds",
        "Duration of sandbox command executions",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register SANDBOX_EXEC_DURATION metric");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
