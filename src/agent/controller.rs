//! Agent Controller - plan → execute → observe → summarize loop
//!
//! Each cycle asks the planner for one command, runs it in the sandbox,
//! bounds the result into an observation, folds that observation into the
//! running summary, and checks whether the flag has shown up.
//!
//! Failure isolation:
//! - no extractable command, or a sandbox failure, is absorbed into the
//!   cycle as a "no output" observation and counted as a command error
//! - a text generation failure ends the attempt with [`AgentError`]

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span, warn, Instrument};

use super::extractor::CommandExtractor;
use super::prompts::PromptTemplates;
use super::session::{
    flag_found, Observation, Plan, Session, TerminalState, NO_COMMAND_LABEL, NO_OUTPUT_TEXT,
};
use crate::metrics::{
    AGENT_CYCLES, COMMAND_ERRORS, LLM_CALL_DURATION, OBSERVATIONS_TRUNCATED, TOKENS,
};
use crate::ollama::{ChatError, ChatMessage, Generation, SamplingConfig, TextGenerator};
use crate::sandbox::{ExecOutput, Sandbox, SandboxError, ShellCommand};

/// Printed after each block of verbose console output
pub const PRINT_SEPARATOR: &str = "\n⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯⎯\n";

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of cycles per challenge
    pub max_tries: usize,
    /// Wall-clock limit for each sandbox command, enforced by the sandbox
    pub timeout_secs: u64,
    /// Maximum observation length in characters before truncation
    pub observation_limit: usize,
    /// Sampling options for both planner and summarizer calls
    pub sampling: SamplingConfig,
    /// Print planner output, command output and summaries to stdout
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tries: 20,
            timeout_secs: 10,
            observation_limit: 2000,
            sampling: SamplingConfig::default(),
            verbose: false,
        }
    }
}

/// Record of a single cycle
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub step_index: usize,
    pub planner_text: String,
    pub command_label: String,
    /// Decoded command output before truncation
    pub command_output: String,
    pub observation_truncated: bool,
}

/// Result of a finished challenge attempt
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub state: TerminalState,
    pub steps_taken: usize,
    pub step_index: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub command_errors: usize,
    pub cycles: Vec<CycleRecord>,
}

impl AgentResult {
    pub fn solved(&self) -> bool {
        self.state == TerminalState::Solved
    }

    fn from_session(session: &Session, cycles: Vec<CycleRecord>) -> Self {
        Self {
            state: session.state(),
            steps_taken: session.steps_taken(),
            step_index: session.step_index(),
            tokens_in: session.tokens_in(),
            tokens_out: session.tokens_out(),
            command_errors: session.command_errors(),
            cycles,
        }
    }
}

/// Error type for agent operations
///
/// Only text generation failures escape the loop; everything else is
/// folded into observations.
#[derive(Debug)]
pub enum AgentError {
    Generation {
        role: &'static str,
        source: ChatError,
    },
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Generation { role, source } => {
                write!(f, "{} generation failed: {}", role, source)
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Generation { source, .. } => Some(source),
        }
    }
}

/// Agent Controller orchestrating the model and the sandbox
pub struct AgentController {
    generator: Arc<dyn TextGenerator>,
    sandbox: Arc<dyn Sandbox>,
    prompts: PromptTemplates,
    extractor: CommandExtractor,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `generator` - Text generation backend used for planner and summarizer
    /// * `sandbox` - Sandbox that runs the extracted commands
    /// * `prompts` - Validated planner/summarizer templates
    /// * `config` - Agent configuration
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        sandbox: Arc<dyn Sandbox>,
        prompts: PromptTemplates,
        config: AgentConfig,
    ) -> Self {
        Self {
            generator,
            sandbox,
            prompts,
            extractor: CommandExtractor::default(),
            config,
        }
    }

    /// Use non-default command delimiters
    pub fn with_extractor(mut self, extractor: CommandExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Run cycles until the flag is found or `max_tries` is used up
    ///
    /// On a generation failure the session is marked `Failed` before the
    /// error is returned, so the caller can still read its counters.
    pub async fn run(
        &self,
        session: &mut Session,
        flag: &str,
        trace_id: &str,
    ) -> Result<AgentResult, AgentError> {
        let mut cycles = Vec::new();

        while session.is_running() && session.step_index() < self.config.max_tries {
            let cycle_span = info_span!(
                "agent_cycle",
                trace_id = %trace_id,
                step = session.step_index(),
                otel.name = "agent_cycle"
            );

            match self.run_cycle(session, flag).instrument(cycle_span).await {
                Ok(record) => cycles.push(record),
                Err(e) => {
                    warn!(trace_id = %trace_id, step = session.step_index(), error = %e, "Cycle failed");
                    session.mark_failed();
                    return Err(e);
                }
            }
        }

        if session.is_running() {
            session.mark_exhausted();
        }

        info!(
            trace_id = %trace_id,
            state = session.state().as_str(),
            steps = session.steps_taken(),
            tokens_in = session.tokens_in(),
            tokens_out = session.tokens_out(),
            "Agent loop finished"
        );

        Ok(AgentResult::from_session(session, cycles))
    }

    /// One plan → execute → observe → summarize → check cycle
    pub async fn run_cycle(&self, session: &mut Session, flag: &str) -> Result<CycleRecord, AgentError> {
        let step_index = session.step_index();
        AGENT_CYCLES.inc();

        let plan = self.plan(session).await?;
        if self.config.verbose {
            println!("Planner output: {}", plan.raw_text);
        }

        let (command_label, command_output) = match &plan.extracted_command {
            Some(command) => match self.execute(command).await {
                Ok(output) => {
                    if output.timed_out() {
                        info!(step = step_index, "Command hit the sandbox timeout");
                    }
                    (command.to_string(), output.text())
                }
                Err(e) => {
                    warn!(step = step_index, command = %command, error = %e, "Sandbox execution failed");
                    session.record_command_error();
                    COMMAND_ERRORS.with_label_values(&["sandbox"]).inc();
                    (command.to_string(), NO_OUTPUT_TEXT.to_string())
                }
            },
            None => {
                debug!(step = step_index, "No command in planner output");
                session.record_command_error();
                COMMAND_ERRORS.with_label_values(&["no_command"]).inc();
                (NO_COMMAND_LABEL.to_string(), NO_OUTPUT_TEXT.to_string())
            }
        };

        if self.config.verbose {
            print!("{}{}", command_output, PRINT_SEPARATOR);
        }

        let observation =
            Observation::bounded(&command_label, &command_output, self.config.observation_limit);
        if observation.truncated {
            OBSERVATIONS_TRUNCATED.inc();
            debug!(step = step_index, "New observation truncated");
        }
        session.set_observation(&observation);

        let summary = self.summarize(session).await?;
        session.replace_summary(summary);
        if self.config.verbose {
            print!("Current summary:\n{}{}", session.running_summary(), PRINT_SEPARATOR);
        }

        if flag_found(flag, session.running_summary(), &command_output) {
            info!(step = step_index, "Flag found");
            session.mark_solved();
        } else {
            session.advance(self.config.max_tries);
        }

        Ok(CycleRecord {
            step_index,
            planner_text: plan.raw_text,
            command_label,
            command_output,
            observation_truncated: observation.truncated,
        })
    }

    /// Ask the planner for the next command
    async fn plan(&self, session: &mut Session) -> Result<Plan, AgentError> {
        let messages = self
            .prompts
            .planner_messages(session.running_summary(), session.target_text());
        let generation = self.generate("planner", &messages, session).await?;

        let extracted_command = self.extractor.extract(&generation.text).into_command();
        Ok(Plan {
            raw_text: generation.text,
            extracted_command,
            input_tokens: generation.input_tokens,
            output_tokens: generation.output_tokens,
        })
    }

    /// Condense the running summary and the live observation into a new summary
    async fn summarize(&self, session: &mut Session) -> Result<String, AgentError> {
        let messages = self
            .prompts
            .summarizer_messages(session.running_summary(), session.last_observation());
        let generation = self.generate("summarizer", &messages, session).await?;
        Ok(generation.text)
    }

    async fn generate(
        &self,
        role: &'static str,
        messages: &[ChatMessage],
        session: &mut Session,
    ) -> Result<Generation, AgentError> {
        let start = Instant::now();
        let generation = self
            .generator
            .generate(messages, &self.config.sampling)
            .await
            .map_err(|source| AgentError::Generation { role, source })?;

        LLM_CALL_DURATION
            .with_label_values(&[role])
            .observe(start.elapsed().as_secs_f64());
        TOKENS
            .with_label_values(&[role, "input"])
            .inc_by(generation.input_tokens as f64);
        TOKENS
            .with_label_values(&[role, "output"])
            .inc_by(generation.output_tokens as f64);

        session.add_tokens(generation.input_tokens, generation.output_tokens);
        debug!(
            role,
            input_tokens = generation.input_tokens,
            output_tokens = generation.output_tokens,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Generation completed"
        );
        Ok(generation)
    }

    /// Run one command, starting the sandbox first if needed
    async fn execute(&self, command: &ShellCommand) -> Result<ExecOutput, SandboxError> {
        self.sandbox.ensure_running().await?;
        self.sandbox.exec_run(command, self.config.timeout_secs).await
    }
}
