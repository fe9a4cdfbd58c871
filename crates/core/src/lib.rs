//! # FinMentor Core
//!
//! Domain types, traits, and error definitions for the FinMentor
//! conversational-assistant orchestration layer.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (store, cache, LLM provider, behavioral context) is a
//! trait here. Implementations live in their respective crates, so the
//! orchestration core can be exercised with in-memory stand-ins.

pub mod error;
pub mod message;
pub mod usage;
pub mod provider;
pub mod store;
pub mod cache;
pub mod behavior;
pub mod locale;

// Re-export key types at crate root for ergonomics
pub use error::{Rejection, ProviderError, StoreError};
pub use message::{Message, Metadata, Role, Thread, ThreadSummary};
pub use usage::{UsageFlags, UsageKind, UsageRecord};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Turn, Usage};
pub use store::Store;
pub use cache::{CacheEntry, ResponseCache};
pub use behavior::{BehaviorProvider, Persona, RewardDescriptor, RewardGranter, StrategySignals};
pub use locale::Locale;
