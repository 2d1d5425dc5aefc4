//! Course recommendations derived from assessment answers.
//!
//! The rule-based generator in [`rules`] is the default and the fallback;
//! [`engine::RecommendationEngine`] optionally layers an LLM on top.

pub mod engine;
pub mod rules;

pub use engine::{EngineConfig, Generated, RecommendationEngine};
pub use rules::{Recommendation, Roadmap, recommend};
