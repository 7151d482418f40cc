//! Untrusted shell command text and its single escaping step

use super::SandboxError;

/// A command proposed by the model, kept verbatim until it reaches the sandbox
///
/// The text is never split into words on this side. It is quoted exactly
/// once, as one shell word, and handed to `/bin/bash -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    raw: String,
}

impl ShellCommand {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The command quoted as a single POSIX shell word
    pub fn quoted(&self) -> Result<String, SandboxError> {
        shlex::try_quote(&self.raw)
            .map(|quoted| quoted.into_owned())
            .map_err(|e| SandboxError::Quote(e.to_string()))
    }

    /// Shell invocation that runs the command under coreutils `timeout`
    pub fn with_timeout(&self, timeout_secs: u64) -> Result<String, SandboxError> {
        Ok(format!(
            "timeout {}s /bin/bash -c {}",
            timeout_secs,
            self.quoted()?
        ))
    }
}

impl std::fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
