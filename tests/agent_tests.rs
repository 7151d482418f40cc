//! Integration tests for the agent loop
//!
//! The model and the sandbox are replaced by scripted fakes, so these tests
//! exercise the full plan → execute → observe → summarize cycle without
//! Ollama or Docker.

mod common;

use std::sync::Arc;

use common::{prompts, reply, sandbox_failure, FakeSandbox, ScriptedLlm};
use flagseeker::agent::session::{NO_COMMAND_LABEL, NO_OUTPUT_TEXT, TRUNCATION_MARKER};
use flagseeker::agent::{AgentConfig, AgentController, Session, TerminalState};
use flagseeker::ollama::ChatError;
use flagseeker::sandbox::{ExecOutput, TIMEOUT_EXIT_CODE};

fn config(max_tries: usize) -> AgentConfig {
    AgentConfig {
        max_tries,
        ..Default::default()
    }
}

fn controller(llm: &Arc<ScriptedLlm>, sandbox: &Arc<FakeSandbox>, config: AgentConfig) -> AgentController {
    AgentController::new(llm.clone(), sandbox.clone(), prompts(), config)
}

/// Test the default agent settings
#[test]
fn test_agent_config_defaults() {
    let config = AgentConfig::default();

    assert_eq!(config.max_tries, 20);
    assert_eq!(config.timeout_secs, 10);
    assert_eq!(config.observation_limit, 2000);
    assert!(!config.verbose);
}

/// Flag printed on the first command solves the challenge in one cycle
#[tokio::test]
async fn test_flag_in_first_output_solves_at_step_zero() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .plan(reply("Let me look. <CMD>echo FLAG{abc}</CMD>"))
            .summary(reply("Ran echo and saw some output.")),
    );
    let sandbox = Arc::new(FakeSandbox::running().then_output("FLAG{abc}\n"));
    let agent = controller(&llm, &sandbox, config(20));

    let mut session = Session::new("Challenge description: warmup");
    let result = agent.run(&mut session, "FLAG{abc}", "trace").await.unwrap();

    assert!(result.solved());
    assert_eq!(result.state, TerminalState::Solved);
    assert_eq!(result.step_index, 0);
    assert_eq!(result.steps_taken, 1);
    assert_eq!(result.cycles.len(), 1);
    assert_eq!(llm.planner_calls(), 1);
    assert_eq!(sandbox.executed_commands(), vec!["echo FLAG{abc}"]);
}

/// The summarizer sees the bounded observation of the command it ran
#[tokio::test]
async fn test_summarizer_receives_observation() {
    let llm = Arc::new(ScriptedLlm::new().plan(reply("<CMD>cat notes.txt</CMD>")));
    let sandbox = Arc::new(FakeSandbox::running().then_output("hello\n"));
    let agent = controller(&llm, &sandbox, config(1));

    let mut session = Session::new("target");
    agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    let prompts = llm.summarizer_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("cat notes.txt:\nhello"));
    assert_eq!(session.last_observation(), "cat notes.txt:\nhello");
}

/// Sandbox failures are absorbed into the cycle and counted
#[tokio::test]
async fn test_sandbox_failures_exhaust_budget() {
    let llm = Arc::new(ScriptedLlm::new());
    let sandbox = Arc::new(
        FakeSandbox::running()
            .then(sandbox_failure())
            .then(sandbox_failure())
            .then(sandbox_failure()),
    );
    let agent = controller(&llm, &sandbox, config(3));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{never}", "trace").await.unwrap();

    assert!(!result.solved());
    assert_eq!(result.state, TerminalState::Exhausted);
    assert_eq!(result.steps_taken, 3);
    assert_eq!(result.command_errors, 3);
    assert_eq!(llm.summarizer_calls(), 3);

    // Label keeps the command, output falls back to the placeholder
    let expected = format!("ls:\n{}", NO_OUTPUT_TEXT);
    assert_eq!(session.last_observation(), expected);
}

/// A command killed by the timeout is observed like any other output
#[tokio::test]
async fn test_timed_out_command_keeps_partial_output() {
    let llm = Arc::new(ScriptedLlm::new().plan(reply("<CMD>sleep 100; echo x</CMD>")));
    let killed = ExecOutput::new(Some(TIMEOUT_EXIT_CODE), b"partial\n".to_vec());
    let sandbox = Arc::new(FakeSandbox::running().then(Ok(killed)));
    let agent = controller(&llm, &sandbox, config(2));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    assert_eq!(result.command_errors, 0);
    assert_eq!(result.cycles[0].command_output, "partial");
    assert_eq!(
        llm.summarizer_prompts.lock().unwrap()[0],
        "Summary:\n\nNew observation:\nsleep 100; echo x:\npartial"
    );
    // The loop carried on to the next cycle
    assert_eq!(result.steps_taken, 2);
    assert_eq!(llm.planner_calls(), 2);
}

/// Planner output without delimiters never reaches the sandbox
#[tokio::test]
async fn test_missing_command_counts_as_error() {
    let llm = Arc::new(ScriptedLlm::new().plan(reply("I think we should scan the ports first.")));
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(1));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    assert_eq!(result.command_errors, 1);
    assert!(sandbox.executed_commands().is_empty());
    assert_eq!(
        session.last_observation(),
        format!("{}:\n{}", NO_COMMAND_LABEL, NO_OUTPUT_TEXT)
    );
}

/// Conflicting commands in one reply are treated like no command
#[tokio::test]
async fn test_ambiguous_commands_are_not_run() {
    let llm = Arc::new(ScriptedLlm::new().plan(reply("<CMD>ls</CMD> or maybe <CMD>pwd</CMD>")));
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(1));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    assert_eq!(result.command_errors, 1);
    assert!(sandbox.executed_commands().is_empty());
}

/// Long outputs are cut to the observation limit with the marker appended
#[tokio::test]
async fn test_observation_is_truncated() {
    let long_output = "a".repeat(5000);
    let llm = Arc::new(ScriptedLlm::new().plan(reply("<CMD>cat big</CMD>")));
    let sandbox = Arc::new(FakeSandbox::running().then_output(&long_output));
    let agent = controller(&llm, &sandbox, config(1));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    let observation = session.last_observation();
    assert!(observation.ends_with(TRUNCATION_MARKER));
    assert_eq!(
        observation.chars().count(),
        2000 + TRUNCATION_MARKER.chars().count()
    );
    assert!(result.cycles[0].observation_truncated);
    // The flag check still runs against the full output
    assert_eq!(result.cycles[0].command_output.len(), 5000);
}

/// A flag beyond the truncation point is still detected in the raw output
#[tokio::test]
async fn test_flag_after_truncation_point_is_found() {
    let output = format!("{}FLAG{{late}}", "x".repeat(3000));
    let llm = Arc::new(ScriptedLlm::new().plan(reply("<CMD>cat big</CMD>")));
    let sandbox = Arc::new(FakeSandbox::running().then_output(&output));
    let agent = controller(&llm, &sandbox, config(5));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{late}", "trace").await.unwrap();

    assert!(result.solved());
    assert!(!session.last_observation().contains("FLAG{late}"));
}

/// The summarizer reporting the flag is enough to solve
#[tokio::test]
async fn test_flag_found_in_summary_only() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .plan(reply("<CMD>strings secret.bin</CMD>"))
            .summary(reply("Decoded the strings, the flag is picoCTF{s3cr3t}")),
    );
    let sandbox = Arc::new(FakeSandbox::running().then_output("cGljb0NURntzM2NyM3R9"));
    let agent = controller(&llm, &sandbox, config(5));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "picoCTF{s3cr3t}", "trace").await.unwrap();

    assert!(result.solved());
    assert_eq!(result.steps_taken, 1);
}

/// Matching is exact: a differently cased flag does not count
#[tokio::test]
async fn test_flag_match_is_case_sensitive() {
    let llm = Arc::new(ScriptedLlm::new().summary(reply("found flag{abc}")));
    let sandbox = Arc::new(FakeSandbox::running().then_output("FLAG{ABC}"));
    let agent = controller(&llm, &sandbox, config(1));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{abc}", "trace").await.unwrap();

    assert!(!result.solved());
}

/// Each cycle replaces the summary instead of appending to it
#[tokio::test]
async fn test_summary_is_replaced_each_cycle() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .summary(reply("first summary"))
            .summary(reply("second summary")),
    );
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(3));

    let mut session = Session::new("target");
    agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    let planner = llm.planner_prompts.lock().unwrap();
    assert_eq!(planner.len(), 3);
    assert!(!planner[0].contains("summary"));
    assert!(planner[1].contains("first summary"));
    assert!(planner[2].contains("second summary"));
    assert!(!planner[2].contains("first summary"));
    assert!(planner.iter().all(|p| p.ends_with("target")));
}

/// A generation failure ends the attempt and marks the session failed
#[tokio::test]
async fn test_generation_failure_marks_session_failed() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .plan(reply("<CMD>id</CMD>"))
            .plan(Err(ChatError::Server("model not found".to_string()))),
    );
    let sandbox = Arc::new(FakeSandbox::running().then_output("uid=0(root)"));
    let agent = controller(&llm, &sandbox, config(5));

    let mut session = Session::new("target");
    let err = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap_err();

    assert!(err.to_string().contains("planner"));
    assert!(err.to_string().contains("model not found"));
    assert_eq!(session.state(), TerminalState::Failed);
    assert_eq!(session.step_index(), 1);
    assert_eq!(sandbox.executed_commands().len(), 1);
}

/// A summarizer failure is just as fatal as a planner failure
#[tokio::test]
async fn test_summarizer_failure_is_fatal() {
    let llm = Arc::new(ScriptedLlm::new().summary(Err(ChatError::EmptyResponse)));
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(5));

    let mut session = Session::new("target");
    let err = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap_err();

    assert!(err.to_string().contains("summarizer"));
    assert_eq!(session.state(), TerminalState::Failed);
}

/// A stopped sandbox is started before the command runs
#[tokio::test]
async fn test_stopped_sandbox_is_started() {
    let llm = Arc::new(ScriptedLlm::new());
    let sandbox = Arc::new(FakeSandbox::stopped());
    let agent = controller(&llm, &sandbox, config(2));

    let mut session = Session::new("target");
    agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    assert_eq!(sandbox.start_count(), 1);
    assert_eq!(sandbox.executed_commands().len(), 2);
}

/// Commands carry the configured timeout to the sandbox
#[tokio::test]
async fn test_timeout_is_passed_to_sandbox() {
    let llm = Arc::new(ScriptedLlm::new());
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(
        &llm,
        &sandbox,
        AgentConfig {
            max_tries: 1,
            timeout_secs: 42,
            ..Default::default()
        },
    );

    let mut session = Session::new("target");
    agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    let executed = sandbox.executed.lock().unwrap();
    assert_eq!(executed[0].1, 42);
}

/// Commands with shell metacharacters reach the sandbox verbatim
#[tokio::test]
async fn test_command_text_is_not_escaped_twice() {
    let raw = r#"echo "it's" | grep -o 'it' ; cat $HOME/x"#;
    let llm = Arc::new(ScriptedLlm::new().plan(reply(&format!("<CMD>{}</CMD>", raw))));
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(1));

    let mut session = Session::new("target");
    agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    let executed = sandbox.executed.lock().unwrap();
    let command = &executed[0].0;
    assert_eq!(command.as_str(), raw);

    let words = shlex::split(&command.with_timeout(10).unwrap()).unwrap();
    assert_eq!(words, vec!["timeout", "10s", "/bin/bash", "-c", raw]);
}

/// Tokens from both planner and summarizer calls are accumulated
#[tokio::test]
async fn test_tokens_accumulate_across_calls() {
    let llm = Arc::new(ScriptedLlm::new());
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(2));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    // 2 cycles x 2 calls x (10 in, 5 out)
    assert_eq!(result.tokens_in, 40);
    assert_eq!(result.tokens_out, 20);
}

/// A zero step budget ends the attempt without any calls
#[tokio::test]
async fn test_zero_max_tries_is_exhausted_immediately() {
    let llm = Arc::new(ScriptedLlm::new());
    let sandbox = Arc::new(FakeSandbox::running());
    let agent = controller(&llm, &sandbox, config(0));

    let mut session = Session::new("target");
    let result = agent.run(&mut session, "FLAG{x}", "trace").await.unwrap();

    assert_eq!(result.state, TerminalState::Exhausted);
    assert_eq!(result.steps_taken, 0);
    assert_eq!(llm.planner_calls(), 0);
}
