//! Rule-based recommendation generator.
//!
//! Pure and deterministic: `interest` picks one of four course tracks,
//! `experience` adjusts the reasoning and the timeline.

use serde::{Deserialize, Serialize};

use crate::leads::model::AssessmentAnswers;

/// A four-phase learning roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    pub foundation: Vec<String>,
    pub core: Vec<String>,
    pub specialization: Vec<String>,
    pub career: Vec<String>,
    /// Total duration, e.g. "12 months".
    pub timeline: String,
}

impl Roadmap {
    /// Phases in order, with their display labels.
    pub fn phases(&self) -> [(&'static str, &[String]); 4] {
        [
            ("Foundation", self.foundation.as_slice()),
            ("Core Skills", self.core.as_slice()),
            ("Specialization", self.specialization.as_slice()),
            ("Career Launch", self.career.as_slice()),
        ]
    }
}

/// A personalized course recommendation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub recommended_course: String,
    pub reasoning: String,
    pub expected_outcome: String,
    pub success_story: String,
    pub roadmap: Roadmap,
}

/// Static description of one course track.
struct CourseTrack {
    course: &'static str,
    reasoning: &'static str,
    outcome: &'static str,
    success_story: &'static str,
    foundation: &'static [&'static str],
    core: &'static [&'static str],
    specialization: &'static [&'static str],
    career: &'static [&'static str],
}

static AI_ML_TRACK: CourseTrack = CourseTrack {
    course: "AI & Machine Learning",
    reasoning: "Based on your goals, the AI & Machine Learning program gives you the broadest \
                path into the field, covering the models, tooling and projects employers ask for.",
    outcome: "Land a Machine Learning Engineer role with a portfolio of deployed models.",
    success_story: "Priya moved from QA testing to a Machine Learning Engineer role at a fintech \
                    startup eight months after finishing the program, with a 40% salary increase.",
    foundation: &[
        "Python for data work",
        "Linear algebra and statistics essentials",
        "Data wrangling with pandas",
    ],
    core: &[
        "Supervised and unsupervised learning",
        "Model evaluation and feature engineering",
        "Neural network fundamentals",
    ],
    specialization: &[
        "Deep learning with PyTorch",
        "Natural language processing",
        "Computer vision projects",
    ],
    career: &[
        "Capstone project with real data",
        "Portfolio and GitHub review",
        "Mock technical interviews",
    ],
};

static DATA_SCIENCE_TRACK: CourseTrack = CourseTrack {
    course: "Data Science & Analytics",
    reasoning: "Your interest in data science points to the Data Science & Analytics program, \
                which turns raw data into decisions through statistics, SQL and visualization.",
    outcome: "Step into a Data Scientist or Senior Analyst role driving business decisions.",
    success_story: "Marcus, a former accountant, became a Data Scientist at a retail chain and \
                    now leads its demand-forecasting work.",
    foundation: &[
        "Python and SQL fundamentals",
        "Descriptive and inferential statistics",
        "Spreadsheet-to-code workflows",
    ],
    core: &[
        "Exploratory data analysis",
        "Regression and classification models",
        "Data visualization and storytelling",
    ],
    specialization: &[
        "A/B testing and experimentation",
        "Time-series forecasting",
        "Dashboarding with BI tools",
    ],
    career: &[
        "End-to-end analytics capstone",
        "Stakeholder presentation practice",
        "Resume and interview coaching",
    ],
};

static MLOPS_TRACK: CourseTrack = CourseTrack {
    course: "MLOps & AI Engineering",
    reasoning: "Because you want to ship AI to production, the MLOps & AI Engineering program \
                focuses on pipelines, deployment and monitoring of models at scale.",
    outcome: "Become an MLOps or AI Platform Engineer owning production ML systems.",
    success_story: "Daniel went from backend developer to MLOps Engineer at a logistics company, \
                    cutting their model release cycle from weeks to hours.",
    foundation: &[
        "Python and Linux tooling",
        "Git, containers and CI basics",
        "Machine learning refresher",
    ],
    core: &[
        "Model packaging and serving",
        "Data and feature pipelines",
        "Experiment tracking and model registries",
    ],
    specialization: &[
        "Kubernetes for ML workloads",
        "Monitoring, drift detection and retraining",
        "LLM deployment and inference optimization",
    ],
    career: &[
        "Production-grade platform capstone",
        "System design interview prep",
        "Open-source contribution sprint",
    ],
};

static AI_RESEARCH_TRACK: CourseTrack = CourseTrack {
    course: "AI Research & Deep Learning",
    reasoning: "Your research interest fits the AI Research & Deep Learning program, built around \
                reading papers, reproducing results and running original experiments.",
    outcome: "Join a research lab or applied science team as a Research Engineer.",
    success_story: "Lena reproduced two NeurIPS papers during the program and was hired as a \
                    Research Engineer at an AI lab before her capstone was finished.",
    foundation: &[
        "Advanced calculus and probability",
        "Optimization theory",
        "Scientific Python and JAX basics",
    ],
    core: &[
        "Deep learning architectures",
        "Reading and reproducing papers",
        "Experiment design and ablations",
    ],
    specialization: &[
        "Transformers and large language models",
        "Generative models",
        "Reinforcement learning",
    ],
    career: &[
        "Original research project",
        "Paper writing and peer review",
        "Research interview preparation",
    ],
};

fn track_for(interest: Option<&str>) -> &'static CourseTrack {
    match interest {
        Some("data_science") => &DATA_SCIENCE_TRACK,
        Some("mlops") => &MLOPS_TRACK,
        Some("ai_research") => &AI_RESEARCH_TRACK,
        _ => &AI_ML_TRACK,
    }
}

const BEGINNER_NOTE: &str = " Since you're just getting started, we'll add an extended foundation \
                             phase so you build confidence before the core material.";
const EXPERT_NOTE: &str = " With your experience, you can move quickly through the foundation \
                           phase and spend more time on advanced specialization.";

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Build the rule-based recommendation for a set of answers.
///
/// Missing or unrecognized answers yield the default AI & Machine Learning track
/// on a 12-month timeline.
pub fn recommend(answers: &AssessmentAnswers) -> Recommendation {
    let track = track_for(answers.interest());

    let mut reasoning = track.reasoning.to_string();
    let timeline = match answers.experience() {
        Some("beginner") => {
            reasoning.push_str(BEGINNER_NOTE);
            "15 months"
        }
        Some("expert") => {
            reasoning.push_str(EXPERT_NOTE);
            "9 months"
        }
        _ => "12 months",
    };

    Recommendation {
        recommended_course: track.course.to_string(),
        reasoning,
        expected_outcome: track.outcome.to_string(),
        success_story: track.success_story.to_string(),
        roadmap: Roadmap {
            foundation: to_owned_list(track.foundation),
            core: to_owned_list(track.core),
            specialization: to_owned_list(track.specialization),
            career: to_owned_list(track.career),
            timeline: timeline.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_gives_identical_output() {
        let answers = AssessmentAnswers::new()
            .with("interest", "mlops")
            .with("experience", "beginner");
        let first = serde_json::to_string(&recommend(&answers)).unwrap();
        let second = serde_json::to_string(&recommend(&answers)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn data_science_interest_wins_regardless_of_other_fields() {
        let answers = AssessmentAnswers::new()
            .with("interest", "data_science")
            .with("career_goal", "research_scientist")
            .with("background", "biology")
            .with("experience", "expert");
        assert_eq!(recommend(&answers).recommended_course, "Data Science & Analytics");
    }

    #[test]
    fn absent_or_unknown_interest_defaults() {
        assert_eq!(
            recommend(&AssessmentAnswers::new()).recommended_course,
            "AI & Machine Learning"
        );
        let answers = AssessmentAnswers::new().with("interest", "blockchain");
        assert_eq!(recommend(&answers).recommended_course, "AI & Machine Learning");
    }

    #[test]
    fn experience_sets_timeline() {
        let timeline = |exp: &str| {
            recommend(&AssessmentAnswers::new().with("experience", exp))
                .roadmap
                .timeline
        };
        assert_eq!(timeline("beginner"), "15 months");
        assert_eq!(timeline("expert"), "9 months");
        assert_eq!(timeline("intermediate"), "12 months");
        assert_eq!(recommend(&AssessmentAnswers::new()).roadmap.timeline, "12 months");
    }

    #[test]
    fn experience_appends_caveat() {
        let base = recommend(&AssessmentAnswers::new());
        let beginner = recommend(&AssessmentAnswers::new().with("experience", "beginner"));
        assert!(beginner.reasoning.starts_with(&base.reasoning));
        assert!(beginner.reasoning.contains("extended foundation"));
    }

    #[test]
    fn each_track_has_its_own_roadmap() {
        let roadmap = |interest: &str| {
            recommend(&AssessmentAnswers::new().with("interest", interest)).roadmap
        };
        assert_ne!(roadmap("mlops").specialization, roadmap("ai_research").specialization);
        assert_eq!(roadmap("ai_research").foundation.len(), 3);
        assert_eq!(roadmap("mlops").phases()[0].0, "Foundation");
    }
}
