//! Per-challenge agent state
//!
//! A [`Session`] is created for each challenge attempt and dropped when the
//! attempt ends. Nothing in it is carried over to the next challenge: the
//! running summary and the last observation always start empty.
//!
//! Memory is bounded by construction. The model never sees the transcript,
//! only the running summary (replaced wholesale every cycle) plus the single
//! latest observation (truncated to a fixed length).

use serde::Serialize;

use crate::sandbox::ShellCommand;

/// Appended to an observation that was cut at the length limit
pub const TRUNCATION_MARKER: &str = " *Output truncated*";

/// Command label used when the planner produced no usable command
pub const NO_COMMAND_LABEL: &str = "*No command*";

/// Output text used when there is nothing to observe
pub const NO_OUTPUT_TEXT: &str = "*No output.*";

/// Lifecycle of a challenge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalState {
    Running,
    /// The flag appeared in the command output or the summary
    Solved,
    /// `max_tries` cycles ran without finding the flag
    Exhausted,
    /// A fatal error (text generation) ended the attempt
    Failed,
}

impl TerminalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TerminalState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalState::Running => "running",
            TerminalState::Solved => "solved",
            TerminalState::Exhausted => "exhausted",
            TerminalState::Failed => "failed",
        }
    }
}

/// Output of one planner invocation
#[derive(Debug, Clone)]
pub struct Plan {
    pub raw_text: String,
    pub extracted_command: Option<ShellCommand>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Bounded result of one command execution (or of its absence)
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub command_label: String,
    /// `"{command_label}:\n{output}"`, cut to the limit with the marker appended
    pub text: String,
    pub truncated: bool,
}

impl Observation {
    /// Build an observation, truncating it to `limit` characters
    pub fn bounded(command_label: &str, output: &str, limit: usize) -> Self {
        let full = format!("{}:\n{}", command_label, output);

        let (text, truncated) = match full.char_indices().nth(limit) {
            Some((cut, _)) => (format!("{}{}", &full[..cut], TRUNCATION_MARKER), true),
            None => (full, false),
        };

        Self {
            command_label: command_label.to_string(),
            text,
            truncated,
        }
    }

    /// Observation recorded when there was no command to run
    pub fn no_command(limit: usize) -> Self {
        Self::bounded(NO_COMMAND_LABEL, NO_OUTPUT_TEXT, limit)
    }
}

/// Mutable state of one challenge attempt
#[derive(Debug, Clone)]
pub struct Session {
    target_text: String,
    running_summary: String,
    last_observation: String,
    step_index: usize,
    state: TerminalState,
    command_errors: usize,
    tokens_in: u64,
    tokens_out: u64,
}

impl Session {
    /// Fresh session for a challenge described by `target_text`
    pub fn new(target_text: impl Into<String>) -> Self {
        Self {
            target_text: target_text.into(),
            running_summary: String::new(),
            last_observation: String::new(),
            step_index: 0,
            state: TerminalState::Running,
            command_errors: 0,
            tokens_in: 0,
            tokens_out: 0,
        }
    }

    pub fn target_text(&self) -> &str {
        &self.target_text
    }

    pub fn running_summary(&self) -> &str {
        &self.running_summary
    }

    pub fn last_observation(&self) -> &str {
        &self.last_observation
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn state(&self) -> TerminalState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TerminalState::Running
    }

    pub fn command_errors(&self) -> usize {
        self.command_errors
    }

    pub fn tokens_in(&self) -> u64 {
        self.tokens_in
    }

    pub fn tokens_out(&self) -> u64 {
        self.tokens_out
    }

    /// Cycles that actually ran
    ///
    /// A solved session stops without advancing `step_index`, so the solving
    /// cycle is counted here.
    pub fn steps_taken(&self) -> usize {
        match self.state {
            TerminalState::Solved => self.step_index + 1,
            _ => self.step_index,
        }
    }

    /// Replace the running summary with a new one
    pub fn replace_summary(&mut self, summary: impl Into<String>) {
        self.running_summary = summary.into();
    }

    /// Make `observation` the only live observation
    pub fn set_observation(&mut self, observation: &Observation) {
        self.last_observation.clone_from(&observation.text);
    }

    pub fn record_command_error(&mut self) {
        self.command_errors += 1;
    }

    pub fn add_tokens(&mut self, input: u64, output: u64) {
        self.tokens_in += input;
        self.tokens_out += output;
    }

    pub fn mark_solved(&mut self) {
        self.state = TerminalState::Solved;
    }

    pub fn mark_failed(&mut self) {
        self.state = TerminalState::Failed;
    }

    /// Finish a cycle that did not solve the challenge
    pub fn advance(&mut self, max_tries: usize) {
        self.step_index += 1;
        if self.step_index >= max_tries {
            self.state = TerminalState::Exhausted;
        }
    }

    /// End a session that never got to run a cycle
    pub fn mark_exhausted(&mut self) {
        self.state = TerminalState::Exhausted;
    }
}

/// Whether the known flag shows up in the summary or the raw command output
///
/// Exact, case-sensitive substring match. An empty flag never matches.
pub fn flag_found(flag: &str, running_summary: &str, raw_output: &str) -> bool {
    !flag.is_empty() && (running_summary.contains(flag) || raw_output.contains(flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("Challenge description: warmup");
        assert_eq!(session.running_summary(), "");
        assert_eq!(session.last_observation(), "");
        assert_eq!(session.step_index(), 0);
        assert_eq!(session.state(), TerminalState::Running);
        assert_eq!(session.target_text(), "Challenge description: warmup");
    }

    #[test]
    fn test_observation_within_limit() {
        let obs = Observation::bounded("ls", "flag.txt", 2000);
        assert_eq!(obs.text, "ls:\nflag.txt");
        assert!(!obs.truncated);
    }

    #[test]
    fn test_observation_exactly_at_limit() {
        let obs = Observation::bounded("a", "b", 4);
        assert_eq!(obs.text, "a:\nb");
        assert!(!obs.truncated);

        let obs = Observation::bounded("a", "bc", 4);
        assert_eq!(obs.text, format!("a:\nb{}", TRUNCATION_MARKER));
        assert!(obs.truncated);
    }

    #[test]
    fn test_observation_truncated() {
        let output = "x".repeat(5000);
        let obs = Observation::bounded("cat big", &output, 2000);
        assert!(obs.truncated);
        assert!(obs.text.ends_with(TRUNCATION_MARKER));
        assert_eq!(obs.text.chars().count(), 2000 + TRUNCATION_MARKER.chars().count());
        assert!(obs.text.starts_with("cat big:\nxxx"));
    }

    #[test]
    fn test_observation_truncates_on_char_boundary() {
        let output = "é".repeat(100);
        let obs = Observation::bounded("cmd", &output, 10);
        assert_eq!(obs.text, format!("cmd:\n{}{}", "é".repeat(5), TRUNCATION_MARKER));
    }

    #[test]
    fn test_no_command_observation() {
        let obs = Observation::no_command(2000);
        assert_eq!(obs.command_label, NO_COMMAND_LABEL);
        assert_eq!(obs.text, "*No command*:\n*No output.*");
    }

    #[test]
    fn test_advance_until_exhausted() {
        let mut session = Session::new("t");
        session.advance(2);
        assert!(session.is_running());
        session.advance(2);
        assert_eq!(session.state(), TerminalState::Exhausted);
        assert_eq!(session.steps_taken(), 2);
    }

    #[test]
    fn test_solved_counts_current_cycle() {
        let mut session = Session::new("t");
        session.mark_solved();
        assert_eq!(session.step_index(), 0);
        assert_eq!(session.steps_taken(), 1);
        assert!(session.state().is_terminal());
    }

    #[test]
    fn test_flag_found() {
        assert!(flag_found("FLAG{abc}", "", "FLAG{abc}\n"));
        assert!(flag_found("FLAG{abc}", "the flag is FLAG{abc}", ""));
        assert!(!flag_found("FLAG{abc}", "flag{abc}", "FLAG{ab"));
        assert!(!flag_found("", "anything", "anything"));
    }

    #[test]
    fn test_terminal_state_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&TerminalState::Exhausted).unwrap(),
            "\"EXHAUSTED\""
        );
    }
}
