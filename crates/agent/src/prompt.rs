//! Prompt composer.
//!
//! Builds the layered instruction sent to the provider:
//!
//! 1. system framing (mission, answer length, locale)
//! 2. persona overlay
//! 3. situational signal clauses
//! 4. bounded context: summary and masked profile in the text, the retained
//!    tail as prior turns
//! 5. the literal user question
//!
//! Composition is pure. The same inputs always give the same prompt.

use crate::context::BoundedContext;
use finmentor_core::behavior::{Persona, StrategySignals};
use finmentor_core::locale::Locale;
use finmentor_core::provider::Turn;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Inputs to [`compose`]. The profile must already be redacted.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub profile: &'a serde_json::Value,
    pub context: &'a BoundedContext,
    pub persona: Persona,
    pub signals: &'a StrategySignals,
    pub locale: Locale,
}

/// A composed prompt: the final user-turn text plus the prior turns.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub text: String,
    pub prior_turns: Vec<Turn>,
}

/// Compose the chat prompt for one turn.
pub fn compose(input: PromptInput<'_>) -> ComposedPrompt {
    let mut text = String::new();

    text.push_str(
        "You are an expert Financial Mentor and a dedicated Teacher at V-EdFinance.\n\
         Mission: Transform users into financially literate individuals using HOOKED and NUDGE theory.\n",
    );
    let _ = writeln!(
        text,
        "Always respond in {}. Keep the answer under 200 words.",
        language_name(input.locale)
    );
    text.push_str(
        "When a concrete follow-up helps (a lesson, a quiz, a link), append exactly one block \
         [ACTION_CARD]{\"type\": \"...\", \"label\": \"...\", \"target\": \"...\"}[/ACTION_CARD] \
         at the end of the answer.\n\n",
    );

    let _ = writeln!(text, "PERSONA: You are {}", persona_overlay(input.persona));

    for clause in signal_clauses(input.signals) {
        let _ = writeln!(text, "- {clause}");
    }
    text.push('\n');

    if let Some(summary) = &input.context.summary {
        let _ = writeln!(text, "PREVIOUS CONVERSATION SUMMARY: {summary}\n");
    }

    let _ = writeln!(text, "CONTEXT:\n- User profile: {}\n", input.profile);

    let _ = write!(text, "QUESTION: {}", input.context.current);

    ComposedPrompt {
        text,
        prior_turns: input.context.prior_turns(),
    }
}

fn language_name(locale: Locale) -> &'static str {
    match locale {
        Locale::Vi => "Vietnamese (vi)",
        Locale::En => "English (en)",
        Locale::Zh => "Chinese (zh)",
    }
}

fn persona_overlay(persona: Persona) -> &'static str {
    match persona {
        Persona::WiseSage => {
            "a wise and calm financial sage who uses metaphors about seasons and nature."
        }
        Persona::StrictCoach => {
            "a tough-love financial coach who is direct, uses sports metaphors, and focuses on discipline."
        }
        Persona::SupportiveBuddy => {
            "a friendly and encouraging peer who uses casual language and focuses on small wins."
        }
        Persona::Mentor => "a witty and expert financial mentor.",
    }
}

fn signal_clauses(signals: &StrategySignals) -> Vec<String> {
    let mut clauses = Vec::new();

    match signals.group_streak {
        Some(streak) if streak > 5 => clauses.push(format!(
            "Social proof: the user's buddy group is on a {streak}-day streak. Mention it to motivate them."
        )),
        _ => clauses.push("Focus on building consistent habits.".to_string()),
    }

    if signals.churn_risk {
        clauses.push(
            "Loss aversion: the user may stop learning soon. Remind them what progress they would lose."
                .to_string(),
        );
    }

    if let Some(reward) = &signals.reward {
        clauses.push(format!(
            "Variable reward: the user was just granted {} bonus points ({}). Congratulate them briefly.",
            reward.points, reward.reason
        ));
    }

    clauses
}

/// Behavioral nudge chosen for course advice, by lesson progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NudgeStrategy {
    SmallWin,
    SocialProof,
    LossAversion,
    GoalGradient,
}

impl NudgeStrategy {
    pub fn select(completed: u32, total: u32) -> Self {
        if completed == 0 {
            return Self::SmallWin;
        }
        let ratio = if total == 0 {
            1.0
        } else {
            f64::from(completed) / f64::from(total)
        };
        if ratio < 0.3 {
            Self::SocialProof
        } else if ratio < 0.8 {
            Self::LossAversion
        } else {
            Self::GoalGradient
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::SmallWin => {
                "Use a Small Win: make the first step feel tiny (\"Just 5 minutes to finish lesson 1\")."
            }
            Self::SocialProof => {
                "Use Social Proof: show that others are doing it (\"Many students started this week\")."
            }
            Self::LossAversion => {
                "Use Loss Aversion: stress what they would lose by stopping (\"Don't lose your 3-day streak\")."
            }
            Self::GoalGradient => {
                "Use the Goal Gradient effect: stress how close they are (\"You are 90% there, finish now to get your certificate\")."
            }
        }
    }
}

/// Where a user stands in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_title: String,
    pub completed_lessons: u32,
    pub total_lessons: u32,
    #[serde(default)]
    pub next_lesson_title: Option<String>,
    #[serde(default)]
    pub next_lesson_id: Option<String>,
}

/// Compose the structured course-advice prompt.
pub fn compose_advice(
    progress: &CourseProgress,
    signals: &StrategySignals,
    locale: Locale,
) -> String {
    let strategy = NudgeStrategy::select(progress.completed_lessons, progress.total_lessons);
    let mut text = String::new();

    let _ = writeln!(text, "Context: User is learning the course \"{}\".", progress.course_title);
    let _ = writeln!(
        text,
        "Progress: {}/{} lessons completed.",
        progress.completed_lessons, progress.total_lessons
    );
    if let Some(next) = &progress.next_lesson_title {
        let _ = writeln!(text, "Target Lesson: \"{next}\".");
    }
    if let Some(reward) = &signals.reward {
        let _ = writeln!(text, "The user was just granted {} bonus points.", reward.points);
    }
    text.push('\n');
    text.push_str("Task: Provide a \"Nudge\" and a \"Trigger\" for the user using Hooked and Nudge theory.\n");
    let _ = writeln!(text, "{}", strategy.instruction());
    let _ = writeln!(text, "Write the nudge and trigger in {}.", language_name(locale));
    text.push_str("Format: JSON { \"nudge\": string, \"trigger\": string, \"nextStep\": string }");

    text
}
