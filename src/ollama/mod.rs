//! Ollama LLM integration module
//!
//! The agent loop only needs one capability from a language model: turn an
//! ordered list of chat messages into text, and report how many tokens went
//! in and came out. That capability is the [`TextGenerator`] trait; the
//! [`ChatClient`] implements it against Ollama's `/api/chat` endpoint.

pub mod client;
pub mod messages;

use async_trait::async_trait;

pub use client::ChatClient;
pub use messages::{ChatError, ChatMessage};

/// Sampling options forwarded with every generation request
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: f64,
    /// When false, decoding is greedy and `temperature` is ignored
    pub do_sample: bool,
    pub max_new_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.9,
            do_sample: false,
            max_new_tokens: 1024,
        }
    }
}

impl SamplingConfig {
    /// Temperature actually sent to the model
    pub fn effective_temperature(&self) -> f64 {
        if self.do_sample {
            self.temperature
        } else {
            0.0
        }
    }
}

/// Output of a single generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Opaque text generation capability consumed by the agent loop
///
/// Calls are not time-bounded. A failing call is fatal to the challenge
/// attempt that issued it.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingConfig,
    ) -> Result<Generation, ChatError>;
}
