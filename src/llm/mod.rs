//! LLM integration for lessonforge.
//!
//! This module provides the transport to OpenAI-compatible chat-completions
//! endpoints (LiteLLM, OpenRouter). It only knows how to send a request and
//! surface transport errors; classifying failures and shaping content is the
//! job of [`crate::generation`].
//!
//! ```ignore
//! use lessonforge::llm::{LiteLlmClient, LlmProvider, Message, GenerationRequest};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL,
};
