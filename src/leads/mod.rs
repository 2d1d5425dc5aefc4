//! Leads: captured visitors, their assessment answers, and the capture flow.

pub mod capture;
pub mod model;

pub use capture::LeadCapture;
pub use model::{AssessmentAnswers, Lead, LeadStatus, NewLead};
