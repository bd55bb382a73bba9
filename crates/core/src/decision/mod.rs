//! Retry decision logic

pub mod engine;

pub use engine::{Decision, DecisionEngine, DecisionReason, WindowValidation};
