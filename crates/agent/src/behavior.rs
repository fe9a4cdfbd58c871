//! Default behavioral capabilities.
//!
//! [`StaticBehaviorProvider`] serves configured personas and profiles and is
//! what the CLI and gateway use when no external classifier is wired in.
//! [`RandomRewardGranter`] is the optional variable-reward pre-step.

use async_trait::async_trait;
use finmentor_config::RewardConfig;
use finmentor_core::behavior::{BehaviorProvider, Persona, RewardDescriptor, RewardGranter};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Behavior provider backed by fixed in-process tables.
#[derive(Debug, Clone, Default)]
pub struct StaticBehaviorProvider {
    default_persona: Persona,
    personas: HashMap<String, Persona>,
    profiles: HashMap<String, serde_json::Value>,
    at_risk: HashSet<String>,
    streaks: HashMap<String, u32>,
}

impl StaticBehaviorProvider {
    pub fn new(default_persona: Persona) -> Self {
        Self {
            default_persona,
            ..Default::default()
        }
    }

    pub fn with_persona(mut self, user_id: impl Into<String>, persona: Persona) -> Self {
        self.personas.insert(user_id.into(), persona);
        self
    }

    pub fn with_profile(mut self, user_id: impl Into<String>, profile: serde_json::Value) -> Self {
        self.profiles.insert(user_id.into(), profile);
        self
    }

    pub fn with_churn_risk(mut self, user_id: impl Into<String>) -> Self {
        self.at_risk.insert(user_id.into());
        self
    }

    pub fn with_group_streak(mut self, user_id: impl Into<String>, streak: u32) -> Self {
        self.streaks.insert(user_id.into(), streak);
        self
    }
}

#[async_trait]
impl BehaviorProvider for StaticBehaviorProvider {
    async fn classify_persona(&self, user_id: &str) -> Persona {
        self.personas.get(user_id).copied().unwrap_or(self.default_persona)
    }

    async fn predict_churn_risk(&self, user_id: &str) -> bool {
        self.at_risk.contains(user_id)
    }

    async fn group_streak(&self, user_id: &str) -> Option<u32> {
        self.streaks.get(user_id).copied()
    }

    async fn user_profile(&self, user_id: &str) -> serde_json::Value {
        self.profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "displayName": "Student" }))
    }
}

/// Grants a random number of bonus points with a fixed probability.
#[derive(Debug, Clone)]
pub struct RandomRewardGranter {
    probability: f64,
    min_points: u32,
    max_points: u32,
}

impl RandomRewardGranter {
    pub fn new(probability: f64, min_points: u32, max_points: u32) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            min_points: min_points.min(max_points),
            max_points: max_points.max(min_points),
        }
    }

    /// `None` when rewards are disabled.
    pub fn from_config(config: &RewardConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.probability, config.min_points, config.max_points))
    }
}

#[async_trait]
impl RewardGranter for RandomRewardGranter {
    async fn maybe_grant(&self, user_id: &str) -> Option<RewardDescriptor> {
        let points = {
            let mut rng = rand::rng();
            if !rng.random_bool(self.probability) {
                return None;
            }
            rng.random_range(self.min_points..=self.max_points)
        };
        debug!(user_id, points, "Variable reward granted");
        Some(RewardDescriptor {
            points,
            reason: "variable_reward".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_falls_back_to_defaults() {
        let behavior = StaticBehaviorProvider::new(Persona::WiseSage)
            .with_persona("coach-me", Persona::StrictCoach)
            .with_churn_risk("leaving")
            .with_group_streak("grouped", 7);

        assert_eq!(behavior.classify_persona("anyone").await, Persona::WiseSage);
        assert_eq!(behavior.classify_persona("coach-me").await, Persona::StrictCoach);
        assert!(behavior.predict_churn_risk("leaving").await);
        assert!(!behavior.predict_churn_risk("anyone").await);
        assert_eq!(behavior.group_streak("grouped").await, Some(7));
        assert_eq!(behavior.group_streak("anyone").await, None);
        assert_eq!(behavior.user_profile("anyone").await["displayName"], "Student");
    }

    #[tokio::test]
    async fn certain_reward_is_within_range() {
        let granter = RandomRewardGranter::new(1.0, 10, 50);
        for _ in 0..20 {
            let reward = granter.maybe_grant("u").await.unwrap();
            assert!((10..=50).contains(&reward.points));
        }
    }

    #[tokio::test]
    async fn zero_probability_never_grants() {
        let granter = RandomRewardGranter::new(0.0, 10, 50);
        for _ in 0..20 {
            assert!(granter.maybe_grant("u").await.is_none());
        }
    }

    #[test]
    fn disabled_config_builds_nothing() {
        let config = RewardConfig::default();
        assert!(!config.enabled);
        assert!(RandomRewardGranter::from_config(&config).is_none());

        let granter = RandomRewardGranter::new(3.0, 60, 20);
        assert_eq!(granter.probability, 1.0);
        assert_eq!((granter.min_points, granter.max_points), (20, 60));
    }
}
