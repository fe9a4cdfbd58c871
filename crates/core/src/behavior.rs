//! Behavioral context capabilities.
//!
//! The orchestrator never derives personas or churn predictions itself. It
//! asks a [`BehaviorProvider`] for opaque signals and, optionally, a
//! [`RewardGranter`] for a reward descriptor, then folds both into the prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The voice the assistant adopts for a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Persona {
    /// Calm mentor speaking in metaphors about seasons and nature
    WiseSage,
    /// Direct, discipline-focused coach
    StrictCoach,
    /// Casual peer celebrating small wins
    SupportiveBuddy,
    /// Witty expert mentor, used when no classification is available
    #[default]
    Mentor,
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WiseSage => "WISE_SAGE",
            Self::StrictCoach => "STRICT_COACH",
            Self::SupportiveBuddy => "SUPPORTIVE_BUDDY",
            Self::Mentor => "MENTOR",
        };
        f.write_str(s)
    }
}

/// A bonus granted by the reward pre-step. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDescriptor {
    pub points: u32,
    pub reason: String,
}

/// Situational signals folded into the prompt as optional clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySignals {
    /// The user is predicted to drop off soon
    #[serde(default)]
    pub churn_risk: bool,

    /// Current streak of the user's buddy group, if they belong to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_streak: Option<u32>,

    /// A reward granted just before this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardDescriptor>,
}

/// User and behavioral context consumed by the prompt composer.
#[async_trait]
pub trait BehaviorProvider: Send + Sync {
    /// Persona chosen from the user's behavioral classification.
    async fn classify_persona(&self, user_id: &str) -> Persona;

    /// Whether the user looks likely to churn.
    async fn predict_churn_risk(&self, user_id: &str) -> bool;

    /// Streak of the user's buddy group, if any.
    async fn group_streak(&self, user_id: &str) -> Option<u32>;

    /// Raw profile payload. Redacted before it reaches a prompt.
    async fn user_profile(&self, user_id: &str) -> serde_json::Value;
}

/// Optional pre-step that may grant a variable reward for a turn.
#[async_trait]
pub trait RewardGranter: Send + Sync {
    async fn maybe_grant(&self, user_id: &str) -> Option<RewardDescriptor>;
}
