//! Provider construction from configuration.
//!
//! Exactly one provider is active: the one named by `default_provider`.
//! It is always wrapped in a [`TimeoutProvider`].

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::timeout::TimeoutProvider;
use finmentor_config::AppConfig;
use finmentor_core::error::ProviderError;
use finmentor_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the configured provider.
///
/// Fails with `NotConfigured` when the provider needs a key and none is set.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.default_provider.as_str();
    let overrides = config.providers.get(name);

    let api_key = overrides
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());
    let base_url = overrides
        .and_then(|p| p.api_url.clone())
        .or_else(|| default_base_url(name).map(str::to_string));

    let provider: Arc<dyn Provider> = match name {
        "gemini" => {
            let key = require_key(name, api_key)?;
            let mut provider = GeminiProvider::new(key);
            if let Some(url) = overrides.and_then(|p| p.api_url.as_deref()) {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(base_url.as_deref())),
        _ => {
            let key = require_key(name, api_key)?;
            let url = base_url.ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "provider '{name}' needs providers.{name}.api_url"
                ))
            })?;
            Arc::new(OpenAiCompatProvider::new(name, url, key))
        }
    };

    info!(provider = name, timeout_secs = config.provider.timeout_secs, "Provider configured");

    Ok(Arc::new(TimeoutProvider::new(
        provider,
        Duration::from_secs(config.provider.timeout_secs),
    )))
}

/// Model for the active provider: per-provider override, else the default.
pub fn resolve_model(config: &AppConfig) -> String {
    config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.default_model.clone())
        .unwrap_or_else(|| config.default_model.clone())
}

fn require_key(name: &str, key: Option<String>) -> Result<String, ProviderError> {
    key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
        ProviderError::NotConfigured(format!("no API key for provider '{name}'"))
    })
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        _ => None,
    }
}
