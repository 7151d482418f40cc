//! Ollama `/api/chat` client
//!
//! Responses are streamed as newline-delimited JSON. Content fragments are
//! accumulated into a single string and the token counts are taken from the
//! final `done: true` chunk.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;

use super::messages::{ChatError, ChatMessage};
use super::{Generation, SamplingConfig, TextGenerator};

/// One line of the streaming `/api/chat` response
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Reassembles NDJSON lines that may be split across network chunks
#[derive(Debug, Default)]
struct StreamAccumulator {
    pending: Vec<u8>,
    text: String,
    input_tokens: u64,
    output_tokens: u64,
    chunks_seen: usize,
}

impl StreamAccumulator {
    fn push(&mut self, bytes: &[u8]) -> Result<(), ChatError> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line)?;
        }
        Ok(())
    }

    fn consume_line(&mut self, line: &[u8]) -> Result<(), ChatError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }

        let chunk: ChatChunk = serde_json::from_slice(line)?;
        if let Some(error) = chunk.error {
            return Err(ChatError::Server(error));
        }

        self.chunks_seen += 1;
        if let Some(message) = chunk.message {
            self.text.push_str(&message.content);
        }
        if chunk.done {
            self.input_tokens = chunk.prompt_eval_count.unwrap_or(0);
            self.output_tokens = chunk.eval_count.unwrap_or(0);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Generation, ChatError> {
        let rest = std::mem::take(&mut self.pending);
        self.consume_line(&rest)?;

        if self.chunks_seen == 0 {
            return Err(ChatError::EmptyResponse);
        }

        Ok(Generation {
            text: self.text,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        })
    }
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    /// * `model` - The model name (e.g., "llama3.1:8b")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[ChatMessage], sampling: &SamplingConfig) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "options": {
                "temperature": sampling.effective_temperature(),
                "top_p": sampling.top_p,
                "num_predict": sampling.max_new_tokens,
            }
        })
    }

    /// Send a chat request and wait for the complete reply
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingConfig,
    ) -> Result<Generation, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&endpoint)
            .json(&self.request_body(messages, sampling))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status(status.as_u16(), body));
        }

        let mut bytes_stream = response.bytes_stream();
        let mut accumulator = StreamAccumulator::default();
        while let Some(chunk) = bytes_stream.next().await {
            accumulator.push(&chunk?)?;
        }

        accumulator.finish()
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingConfig,
    ) -> Result<Generation, ChatError> {
        self.chat(messages, sampling).await
    }
}
