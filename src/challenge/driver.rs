//! Challenge Driver - runs a benchmark one challenge at a time
//!
//! For every challenge the driver stages the challenge files into the
//! sandbox, opens a fresh [`Session`], runs the agent loop and records the
//! outcome. A fatal error inside one challenge is recorded as a failure and
//! the run moves on to the next challenge.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::benchmark::{file_name, Benchmark, ChallengeRecord, SkippedChallenge};
use crate::agent::{AgentController, Session, TerminalState};
use crate::metrics::{CHALLENGES, STEPS_PER_CHALLENGE};
use crate::sandbox::ShellCommand;

/// Timeout for each file download inside the sandbox
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Result of one challenge attempt
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeOutcome {
    pub id: String,
    pub solved: bool,
    pub state: TerminalState,
    pub steps_taken: usize,
    pub step_index: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub command_errors: usize,
    pub duration_secs: f64,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChallengeOutcome {
    fn from_session(id: &str, session: &Session, trace_id: String, duration_secs: f64) -> Self {
        Self {
            id: id.to_string(),
            solved: session.state() == TerminalState::Solved,
            state: session.state(),
            steps_taken: session.steps_taken(),
            step_index: session.step_index(),
            tokens_in: session.tokens_in(),
            tokens_out: session.tokens_out(),
            command_errors: session.command_errors(),
            duration_secs,
            trace_id,
            error: None,
        }
    }
}

/// Aggregated results of a benchmark run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BenchmarkReport {
    pub max_tries: usize,
    pub outcomes: Vec<ChallengeOutcome>,
    pub skipped: Vec<SkippedChallenge>,
}

impl BenchmarkReport {
    pub fn solved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.solved).count()
    }

    pub fn finished(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.finished() - self.solved()
    }

    pub fn tokens_in(&self) -> u64 {
        self.outcomes.iter().map(|o| o.tokens_in).sum()
    }

    pub fn tokens_out(&self) -> u64 {
        self.outcomes.iter().map(|o| o.tokens_out).sum()
    }

    pub fn command_errors(&self) -> usize {
        self.outcomes.iter().map(|o| o.command_errors).sum()
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Runs challenges through the agent loop
pub struct ChallengeDriver {
    controller: AgentController,
    /// Preamble placed before every challenge description
    target_preamble: String,
}

impl ChallengeDriver {
    pub fn new(controller: AgentController, target_preamble: impl Into<String>) -> Self {
        Self {
            controller,
            target_preamble: target_preamble.into(),
        }
    }

    /// Run every challenge in `benchmark`, strictly one after another
    pub async fn run_benchmark(&self, benchmark: &Benchmark) -> BenchmarkReport {
        let max_tries = self.controller.config().max_tries;
        let mut report = BenchmarkReport {
            max_tries,
            skipped: benchmark.skipped().to_vec(),
            ..Default::default()
        };

        for skipped in &report.skipped {
            CHALLENGES.with_label_values(&["skipped"]).inc();
            println!("[BENCH] Removing challenge {}: {}", skipped.id, skipped.reason);
        }
        println!("[BENCH] Number of challenges to run: {}", benchmark.len());

        for record in benchmark.iter() {
            let outcome = self.run_challenge(record).await;
            let (id, solved, steps) = (outcome.id.clone(), outcome.solved, outcome.steps_taken);
            report.outcomes.push(outcome);

            println!(
                "[solved={}|failed={}|all={}] challenge={} success={} in {}/{} steps.",
                report.solved(),
                report.failed(),
                benchmark.len(),
                id,
                solved,
                steps,
                max_tries
            );
        }

        info!(
            solved = report.solved(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            tokens_in = report.tokens_in(),
            tokens_out = report.tokens_out(),
            "Benchmark finished"
        );
        report
    }

    /// Attempt a single challenge with a fresh session
    pub async fn run_challenge(&self, record: &ChallengeRecord) -> ChallengeOutcome {
        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "challenge",
            trace_id = %trace_id,
            challenge = %record.id,
            otel.name = "challenge"
        );

        async {
            info!(trace_id = %trace_id, challenge = %record.id, "Starting challenge");
            if record.description.is_none() {
                info!(challenge = %record.id, "No description set, using the default");
            }

            let start = Instant::now();
            self.stage_files(record).await;

            let mut session = Session::new(record.target_text(&self.target_preamble));
            let result = self.controller.run(&mut session, &record.flag, &trace_id).await;

            let mut outcome = ChallengeOutcome::from_session(
                &record.id,
                &session,
                trace_id.clone(),
                start.elapsed().as_secs_f64(),
            );
            if let Err(e) = result {
                warn!(trace_id = %trace_id, challenge = %record.id, error = %e, "Challenge attempt abandoned");
                outcome.error = Some(e.to_string());
            }

            CHALLENGES.with_label_values(&[outcome.state.as_str()]).inc();
            STEPS_PER_CHALLENGE.observe(outcome.steps_taken as f64);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Download the challenge files into the sandbox working directory
    ///
    /// Failures are logged; the challenge still runs without the file.
    async fn stage_files(&self, record: &ChallengeRecord) {
        if record.files.is_empty() {
            return;
        }

        let sandbox = self.controller.sandbox();
        if let Err(e) = sandbox.ensure_running().await {
            warn!(challenge = %record.id, error = %e, "Sandbox unavailable, files not staged");
            return;
        }

        for url in &record.files {
            let command = match download_command(url) {
                Ok(command) => command,
                Err(e) => {
                    warn!(challenge = %record.id, url = %url, error = %e, "Cannot quote download");
                    continue;
                }
            };

            match sandbox.exec_run(&command, DOWNLOAD_TIMEOUT_SECS).await {
                Ok(output) if output.exit_code == Some(0) => {
                    info!(challenge = %record.id, file = file_name(url), "Staged file");
                }
                Ok(output) => {
                    warn!(
                        challenge = %record.id,
                        url = %url,
                        exit_code = ?output.exit_code,
                        output = %output.text(),
                        "Download failed"
                    );
                }
                Err(e) => warn!(challenge = %record.id, url = %url, error = %e, "Download failed"),
            }
        }
    }
}

/// `wget <url> -O <name>` with both arguments quoted
fn download_command(url: &str) -> Result<ShellCommand, shlex::QuoteError> {
    let quoted_url = shlex::try_quote(url)?;
    let quoted_name = shlex::try_quote(file_name(url))?;
    Ok(ShellCommand::new(format!(
        "wget -q {} -O {}",
        quoted_url, quoted_name
    )))
}
