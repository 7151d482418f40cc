//! Agent module for LLM-driven challenge solving
//!
//! This module provides the agent loop that orchestrates:
//! - the planner (model call proposing the next shell command)
//! - command extraction from the planner's free-form answer
//! - sandboxed execution of that command
//! - the summarizer (model call folding the result into a running summary)
//!
//! # Architecture
//!
//! ```text
//! running summary + challenge text → Planner (TextGenerator)
//!                  ↓
//!           CommandExtractor: <CMD>...</CMD>
//!                  ↓
//!           Sandbox.exec_run (timeout) ─── failure → "*No output.*"
//!                  ↓
//!           Observation (truncated to limit)
//!                  ↓
//!           Summarizer (TextGenerator) → replaces running summary
//!                  ↓
//!           flag in summary or output? → SOLVED / next cycle / EXHAUSTED
//! ```

pub mod controller;
pub mod extractor;
pub mod prompts;
pub mod session;

pub use controller::{AgentConfig, AgentController, AgentError, AgentResult, CycleRecord};
pub use extractor::{extract_command, CommandExtractor, Extraction};
pub use prompts::{MissingPlaceholder, PromptTemplates};
pub use session::{Observation, Plan, Session, TerminalState};
