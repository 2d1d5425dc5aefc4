//! Recommendation engine: optional LLM personalization over the rule-based generator.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::leads::model::AssessmentAnswers;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

use super::rules::{Recommendation, recommend};

/// Configuration for LLM-backed generation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 600,
        }
    }
}

/// A recommendation tagged with how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    /// No LLM configured; rule-based output.
    Rules(Recommendation),
    /// Personalized by the LLM.
    Ai(Recommendation),
    /// The LLM was configured but failed; rule-based output.
    Fallback(Recommendation),
}

impl Generated {
    pub fn recommendation(&self) -> &Recommendation {
        match self {
            Self::Rules(r) | Self::Ai(r) | Self::Fallback(r) => r,
        }
    }

    pub fn into_inner(self) -> Recommendation {
        match self {
            Self::Rules(r) | Self::Ai(r) | Self::Fallback(r) => r,
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, Self::Ai(_))
    }
}

/// Produces recommendations, asking the LLM first when one is configured.
pub struct RecommendationEngine {
    llm: Option<Arc<dyn LlmProvider>>,
    config: EngineConfig,
}

impl RecommendationEngine {
    /// Rule-based only.
    pub fn rules_only() -> Self {
        Self {
            llm: None,
            config: EngineConfig::default(),
        }
    }

    /// LLM-backed, falling back to rules on any failure.
    pub fn with_llm(llm: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        Self {
            llm: Some(llm),
            config,
        }
    }

    /// Generate a recommendation. Never fails.
    pub async fn generate(&self, answers: &AssessmentAnswers) -> Generated {
        let base = recommend(answers);
        let Some(llm) = &self.llm else {
            return Generated::Rules(base);
        };

        match self.personalize(llm.as_ref(), answers, &base).await {
            Ok(personalized) => {
                info!(
                    model = llm.model_name(),
                    course = %personalized.recommended_course,
                    "Generated AI recommendation"
                );
                Generated::Ai(personalized)
            }
            Err(e) => {
                warn!(error = %e, "AI recommendation failed, using rule-based fallback");
                Generated::Fallback(base)
            }
        }
    }

    async fn personalize(
        &self,
        llm: &dyn LlmProvider,
        answers: &AssessmentAnswers,
        base: &Recommendation,
    ) -> Result<Recommendation, LlmError> {
        let answers_json = serde_json::to_string_pretty(answers)?;

        let system_prompt = format!(
            "You are a career advisor for an online AI academy. Given a prospective student's \
             assessment answers, write a short personalized course recommendation.\n\n\
             The academy offers: AI & Machine Learning, Data Science & Analytics, \
             MLOps & AI Engineering, AI Research & Deep Learning.\n\
             Our default pick for this student is \"{course}\".\n\n\
             Respond with a JSON object with exactly these string fields:\n\
             - \"recommendedCourse\": one of the courses above\n\
             - \"reasoning\": 2-3 sentences addressed to the student\n\
             - \"expectedOutcome\": one sentence\n\
             - \"successStory\": one or two sentences about a past graduate\n\n\
             ONLY output the JSON object. No other text.",
            course = base.recommended_course
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(format!("Assessment answers:\n{answers_json}")),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = llm.complete(request).await?;
        let parsed = parse_personalization(&response.content).ok_or_else(|| {
            LlmError::InvalidResponse {
                provider: llm.model_name().to_string(),
                reason: "missing or empty recommendation fields".to_string(),
            }
        })?;

        debug!(course = %parsed.recommended_course, "Parsed AI recommendation");
        Ok(Recommendation {
            recommended_course: parsed.recommended_course,
            reasoning: parsed.reasoning,
            expected_outcome: parsed.expected_outcome,
            success_story: parsed.success_story,
            roadmap: base.roadmap.clone(),
        })
    }
}

/// Fields the LLM is asked to produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Personalization {
    recommended_course: String,
    reasoning: String,
    expected_outcome: String,
    success_story: String,
}

fn parse_personalization(text: &str) -> Option<Personalization> {
    let json = extract_json_object(text);
    let parsed: Personalization = serde_json::from_str(&json).ok()?;
    let complete = [
        &parsed.recommended_course,
        &parsed.reasoning,
        &parsed.expected_outcome,
        &parsed.success_story,
    ]
    .iter()
    .all(|s| !s.trim().is_empty());
    complete.then_some(parsed)
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}
