//! Command extraction from free-form planner output
//!
//! The planner is asked to wrap the one command it wants to run in a tag
//! pair, e.g. `<CMD>ls -la</CMD>`. Everything outside the tags is ignored.
//! Failing to find a command is an expected outcome, reported as
//! [`Extraction::NoCommand`] rather than an error.

use crate::sandbox::ShellCommand;

pub const DEFAULT_START_TAG: &str = "<CMD>";
pub const DEFAULT_END_TAG: &str = "</CMD>";

/// Outcome of scanning planner output for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Command(ShellCommand),
    NoCommand,
}

impl Extraction {
    pub fn into_command(self) -> Option<ShellCommand> {
        match self {
            Extraction::Command(cmd) => Some(cmd),
            Extraction::NoCommand => None,
        }
    }
}

/// Finds the delimited command in planner output
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    start_tag: String,
    end_tag: String,
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_START_TAG, DEFAULT_END_TAG)
    }
}

impl CommandExtractor {
    pub fn new(start_tag: impl Into<String>, end_tag: impl Into<String>) -> Self {
        Self {
            start_tag: start_tag.into(),
            end_tag: end_tag.into(),
        }
    }

    /// Extract the single command enclosed by the tag pair
    ///
    /// Returns `NoCommand` when there is no complete tag pair, when any
    /// start tag is left unterminated, when the enclosed text is blank, when
    /// a start tag appears inside a command, or when several tag pairs
    /// enclose different commands. A command
    /// repeated verbatim in several pairs is accepted once.
    pub fn extract(&self, text: &str) -> Extraction {
        let mut found: Option<&str> = None;
        let mut rest = text;

        while let Some(start) = rest.find(&self.start_tag) {
            let body_start = start + self.start_tag.len();
            let Some(len) = rest[body_start..].find(&self.end_tag) else {
                return Extraction::NoCommand;
            };
            let body = &rest[body_start..body_start + len];
            if body.contains(&self.start_tag) {
                return Extraction::NoCommand;
            }

            let command = body.trim();
            if command.is_empty() {
                return Extraction::NoCommand;
            }
            match found {
                Some(previous) if previous != command => return Extraction::NoCommand,
                _ => found = Some(command),
            }

            rest = &rest[body_start + len + self.end_tag.len()..];
        }

        match found {
            Some(command) => Extraction::Command(ShellCommand::new(command)),
            None => Extraction::NoCommand,
        }
    }
}

/// Extract a command using the default `<CMD>`/`</CMD>` tags
pub fn extract_command(text: &str) -> Extraction {
    CommandExtractor::default().extract(text)
}
