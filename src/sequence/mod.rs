//! Post-capture email sequence: stages and the in-process scheduler.

pub mod scheduler;

pub use scheduler::{ScheduledSend, SequenceScheduler};

use std::time::Duration;

use serde::{Deserialize, Serialize};

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// One step of the email cadence, in send order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Welcome,
    AssessmentResults,
    SuccessStories,
    CourseDeepDive,
    SocialProof,
    FinalCta,
}

impl Stage {
    /// Every stage after the welcome email.
    pub const DEFERRED: [Stage; 5] = [
        Stage::AssessmentResults,
        Stage::SuccessStories,
        Stage::CourseDeepDive,
        Stage::SocialProof,
        Stage::FinalCta,
    ];

    /// Template key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::AssessmentResults => "assessment_results",
            Self::SuccessStories => "success_stories",
            Self::CourseDeepDive => "course_deep_dive",
            Self::SocialProof => "social_proof",
            Self::FinalCta => "final_cta",
        }
    }

    /// Delay from capture time.
    pub fn offset(&self) -> Duration {
        match self {
            Self::Welcome => Duration::ZERO,
            Self::AssessmentResults => Duration::from_secs(DAY),
            Self::SuccessStories => Duration::from_secs(3 * DAY),
            Self::CourseDeepDive => Duration::from_secs(5 * DAY),
            Self::SocialProof => Duration::from_secs(7 * DAY),
            Self::FinalCta => Duration::from_secs(10 * DAY),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(Self::Welcome),
            "assessment_results" => Ok(Self::AssessmentResults),
            "success_stories" => Ok(Self::SuccessStories),
            "course_deep_dive" => Ok(Self::CourseDeepDive),
            "social_proof" => Ok(Self::SocialProof),
            "final_cta" => Ok(Self::FinalCta),
            _ => Err(format!("Unknown sequence stage: {}", s)),
        }
    }
}
