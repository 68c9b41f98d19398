//! Stepwise LLM
//!
//! The language-model side of the engine:
//!
//! - `types` - provider-neutral messages, tool schemas, usage and errors
//! - `provider` - the `LlmProvider` trait every client adapter implements
//! - `tokens` - token estimation and per-model context limits
//! - `mock` - a scripted provider for tests (feature `test-support`)

pub mod provider;
pub mod tokens;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use provider::LlmProvider;
pub use tokens::{chars_for_tokens, context_limit, estimate_message_tokens, estimate_tokens};
pub use types::*;
