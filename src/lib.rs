//! flagseeker - LLM agent loop for solving capture-the-flag challenges
//!
//! A language model is driven through a plan → execute → observe →
//! summarize loop against an isolated sandbox until the challenge flag shows
//! up, the step budget runs out, or text generation fails.
//!
//! # Modules
//!
//! - `agent` - the agent loop, command extraction, session state, prompts
//! - `ollama` - text generation capability and the Ollama chat client
//! - `sandbox` - sandbox capability and the Docker implementation
//! - `challenge` - benchmark loading and the challenge driver
//! - `config` - JSON run configuration
//! - `metrics` - Prometheus metrics
//! - `tracing` - logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use flagseeker::{AgentController, AppConfig, Benchmark, ChallengeDriver, ChatClient, DockerSandbox};
//!
//! let config = AppConfig::load("config.json")?;
//! let sandbox = Arc::new(DockerSandbox::new(&config.attackbox).connect(&config.image, None).await?);
//! let llm = Arc::new(ChatClient::new(&config.llm.base_url, &config.llm.model_id));
//! let controller = AgentController::new(llm, sandbox, config.prompts()?, config.agent_config());
//!
//! let driver = ChallengeDriver::new(controller, &config.target_text);
//! let report = driver.run_benchmark(&Benchmark::load("picoctf.json")?).await;
//! ```

pub mod agent;
pub mod challenge;
pub mod config;
pub mod metrics;
pub mod ollama;
pub mod sandbox;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController, AgentError, AgentResult, Session, TerminalState};
pub use challenge::{Benchmark, BenchmarkReport, ChallengeDriver, ChallengeOutcome};
pub use config::{AppConfig, ConfigError};
pub use ollama::{ChatClient, TextGenerator};
pub use sandbox::{DockerSandbox, Sandbox};
