//! In-memory fakes for the text generation and sandbox capabilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use flagseeker::agent::PromptTemplates;
use flagseeker::ollama::{ChatError, ChatMessage, Generation, SamplingConfig, TextGenerator};
use flagseeker::sandbox::{ExecOutput, Sandbox, SandboxError, SandboxStatus, ShellCommand};

pub const PLANNER_SYSTEM: &str = "You are a CTF player. Wrap your command in <CMD></CMD>.";
pub const SUMMARIZER_SYSTEM: &str = "You summarize a pentest session.";

pub fn prompts() -> PromptTemplates {
    PromptTemplates::new(
        PLANNER_SYSTEM,
        "Summary:\n{summarized_history}\n",
        SUMMARIZER_SYSTEM,
        "Summary:\n{summarized_history}\nNew observation:\n{new_observation}",
    )
    .unwrap()
}

pub fn reply(text: &str) -> Result<Generation, ChatError> {
    Ok(Generation {
        text: text.to_string(),
        input_tokens: 10,
        output_tokens: 5,
    })
}

/// Replies from two queues, chosen by the system prompt of the request
///
/// When a queue runs dry the planner asks for `ls` and the summarizer says
/// "nothing yet".
#[derive(Default)]
pub struct ScriptedLlm {
    planner: Mutex<VecDeque<Result<Generation, ChatError>>>,
    summarizer: Mutex<VecDeque<Result<Generation, ChatError>>>,
    pub planner_prompts: Mutex<Vec<String>>,
    pub summarizer_prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(self, reply: Result<Generation, ChatError>) -> Self {
        self.planner.lock().unwrap().push_back(reply);
        self
    }

    pub fn summary(self, reply: Result<Generation, ChatError>) -> Self {
        self.summarizer.lock().unwrap().push_back(reply);
        self
    }

    pub fn planner_calls(&self) -> usize {
        self.planner_prompts.lock().unwrap().len()
    }

    pub fn summarizer_calls(&self) -> usize {
        self.summarizer_prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _sampling: &SamplingConfig,
    ) -> Result<Generation, ChatError> {
        let user = messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if messages[0].content == PLANNER_SYSTEM {
            self.planner_prompts.lock().unwrap().push(user);
            self.planner
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| reply("<CMD>ls</CMD>"))
        } else {
            self.summarizer_prompts.lock().unwrap().push(user);
            self.summarizer
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| reply("nothing yet"))
        }
    }
}

/// Sandbox that replays scripted results and records what it ran
pub struct FakeSandbox {
    running: Mutex<bool>,
    results: Mutex<VecDeque<Result<ExecOutput, SandboxError>>>,
    pub executed: Mutex<Vec<(ShellCommand, u64)>>,
    pub starts: Mutex<usize>,
}

impl FakeSandbox {
    pub fn stopped() -> Self {
        Self {
            running: Mutex::new(false),
            results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            starts: Mutex::new(0),
        }
    }

    pub fn running() -> Self {
        let sandbox = Self::stopped();
        *sandbox.running.lock().unwrap() = true;
        sandbox
    }

    pub fn then(self, result: Result<ExecOutput, SandboxError>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn then_output(self, output: &str) -> Self {
        self.then(Ok(ExecOutput::new(Some(0), output.as_bytes().to_vec())))
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|(cmd, _)| cmd.as_str().to_string())
            .collect()
    }

    pub fn start_count(&self) -> usize {
        *self.starts.lock().unwrap()
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn status(&self) -> Result<SandboxStatus, SandboxError> {
        if *self.running.lock().unwrap() {
            Ok(SandboxStatus::Running)
        } else {
            Ok(SandboxStatus::Stopped("exited".to_string()))
        }
    }

    async fn start(&self) -> Result<(), SandboxError> {
        *self.starts.lock().unwrap() += 1;
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    async fn exec_run(
        &self,
        command: &ShellCommand,
        timeout_secs: u64,
    ) -> Result<ExecOutput, SandboxError> {
        self.executed
            .lock()
            .unwrap()
            .push((command.clone(), timeout_secs));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecOutput::new(Some(0), Vec::new())))
    }
}

pub fn sandbox_failure() -> Result<ExecOutput, SandboxError> {
    Err(SandboxError::Command {
        action: "exec".to_string(),
        stderr: "container is not running".to_string(),
    })
}
