//! Lead funnel: capture leads, send personalized email sequences, report funnel analytics.

pub mod api;
pub mod config;
pub mod email;
pub mod error;
pub mod leads;
pub mod llm;
pub mod recommend;
pub mod sequence;
pub mod store;
