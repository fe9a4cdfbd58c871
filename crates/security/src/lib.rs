//! Privacy guards for FinMentor.
//!
//! Provides:
//! - **PII redaction**: masks sensitive profile fields before any value is
//!   interpolated into a prompt bound for the external provider

pub mod pii;

pub use pii::{redact, EMAIL_MASK, FILLER, SENSITIVE_KEYS};
