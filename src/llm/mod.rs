//! LLM clients backing the evaluation models
//!
//! - [`LLMClient`] - the trait the judge talks to
//! - [`Provider`] - runtime provider selection from `[models.*]`
//!
//! Enable Ollama via the `ollama` Cargo feature (on by default). The OpenAI
//! client speaks plain chat-completions JSON and is always available.

/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

pub mod openai;

pub use client::{LLMClient, Provider};
