//! Shared test helpers for agent tests.

use async_trait::async_trait;
use finmentor_core::behavior::Persona;
use finmentor_core::error::ProviderError;
use finmentor_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

use crate::behavior::StaticBehaviorProvider;

/// A mock provider that replays scripted outcomes in order.
///
/// Every request is recorded for later inspection. Panics if more calls are
/// made than outcomes provided.
pub struct ScriptedProvider {
    outcomes: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(outcomes: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose calls all succeed with the given texts.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            panic!("ScriptedProvider: no more outcomes (call #{call})");
        }

        outcomes.remove(0).map(|text| make_text_response(&text, &request.model))
    }
}

/// Create a text response with fixed usage.
pub fn make_text_response(text: &str, model: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: model.to_string(),
    }
}

/// Behavior provider returning a default persona and an identifiable profile.
pub fn test_behavior() -> StaticBehaviorProvider {
    StaticBehaviorProvider::new(Persona::Mentor).with_profile(
        "u1",
        serde_json::json!({
            "displayName": "Nguyen Lan",
            "email": "lan@example.com",
            "level": 2,
        }),
    )
}
