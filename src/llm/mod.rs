//! LLM integration for frontier-forge.
//!
//! Models are an opaque text-completion capability behind [`LlmProvider`].
//! [`LiteLlmClient`] talks to any OpenAI-compatible endpoint; tests substitute
//! a mock provider with canned responses.
//!
//! ```ignore
//! use frontier_forge::llm::{complete, GenerationRequest, LiteLlmClient, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("2 + 2?")]).with_temperature(0.0);
//! let answer = complete(&client, request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    complete, Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message,
    Usage, DEFAULT_MODEL,
};
