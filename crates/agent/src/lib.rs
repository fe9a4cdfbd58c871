//! The FinMentor orchestration core.
//!
//! Every inbound message runs through one pipeline:
//!
//! 1. **Guard** the user's call rate and monthly token budget
//! 2. **Persist** the user message
//! 3. **Classify** the question; general questions may be served from cache
//! 4. **Assemble** bounded context, summarizing old history when needed
//! 5. **Compose** the prompt from a redacted profile and behavioral signals
//! 6. **Call** the provider once, falling back to a localized reply on failure
//! 7. **Post-process** the answer (action cards) and cache general answers
//! 8. **Persist** the assistant message and the usage record

pub mod behavior;
pub mod context;
pub mod orchestrator;
pub mod postprocess;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use behavior::{RandomRewardGranter, StaticBehaviorProvider};
pub use context::{BoundedContext, ContextWindowManager};
pub use orchestrator::{
    AdviceReply, AssistantReply, Orchestrator, OrchestratorError, OrchestratorSettings, TurnStatus,
};
pub use postprocess::{CourseAdvice, Intent, ProcessedReply};
pub use prompt::{ComposedPrompt, CourseProgress, NudgeStrategy, PromptInput};
