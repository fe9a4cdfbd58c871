//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Counts Unicode scalar values rather than bytes so Vietnamese and Chinese
//! text is not over-charged.

use finmentor_core::provider::{ProviderRequest, ProviderResponse};

/// Estimate the token count for a number of characters.
pub fn estimate_chars(chars: usize) -> u64 {
    chars.div_ceil(4) as u64
}

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> u64 {
    estimate_chars(text.chars().count())
}

/// Tokens to charge for a call: provider-reported when available, else an
/// estimate over prompt and answer.
pub fn call_tokens(request: &ProviderRequest, response: &ProviderResponse) -> u64 {
    match response.usage {
        Some(usage) if usage.total_tokens > 0 => u64::from(usage.total_tokens),
        _ => estimate_chars(request.input_chars() + response.text.chars().count()),
    }
}

/// Tokens to charge for a failed call: the prompt that was sent.
pub fn failed_call_tokens(request: &ProviderRequest) -> u64 {
    estimate_chars(request.input_chars())
}
