//! LLM provider implementations for FinMentor.
//!
//! All providers implement the `finmentor_core::Provider` trait.
//! [`build_from_config`] builds the single configured provider, wrapped in a
//! timeout.

pub mod factory;
pub mod gemini;
pub mod openai_compat;
pub mod timeout;

pub use factory::{build_from_config, resolve_model};
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use timeout::TimeoutProvider;
