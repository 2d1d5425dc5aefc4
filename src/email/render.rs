//! Email content renderer: template + recommendation + lead identity.
//!
//! Rendering never fails. A stage without a template uses the generic one;
//! anything else that goes wrong yields a hardcoded fallback email.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::leads::model::AssessmentAnswers;
use crate::recommend::{RecommendationEngine, Recommendation, Roadmap};

use super::templates::{TemplateStore, generic_template};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid placeholder regex"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("valid italic regex"));

/// Final content for one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    /// HTML body, ready for the transport.
    pub content: String,
    /// Plain-text body.
    pub text: String,
    /// Call-to-action link.
    pub cta: String,
}

/// Renders stage emails for a lead.
pub struct EmailRenderer {
    templates: Arc<TemplateStore>,
    engine: Arc<RecommendationEngine>,
    cta_url: String,
    advisor_name: String,
}

impl EmailRenderer {
    pub fn new(
        templates: Arc<TemplateStore>,
        engine: Arc<RecommendationEngine>,
        cta_url: impl Into<String>,
        advisor_name: impl Into<String>,
    ) -> Self {
        Self {
            templates,
            engine,
            cta_url: cta_url.into(),
            advisor_name: advisor_name.into(),
        }
    }

    /// Render the email for `stage`.
    pub async fn render(&self, stage: &str, answers: &AssessmentAnswers, name: &str) -> RenderedEmail {
        let generated = self.engine.generate(answers).await;
        match self.try_render(stage, generated.recommendation(), name) {
            Ok(email) => {
                debug!(stage, ai = generated.is_ai(), "Rendered email");
                email
            }
            Err(e) => {
                warn!(stage, error = %e, "Email render failed, using fallback content");
                self.fallback_email(name)
            }
        }
    }

    fn try_render(
        &self,
        stage: &str,
        rec: &Recommendation,
        name: &str,
    ) -> Result<RenderedEmail, RenderError> {
        let template = match self.templates.get(stage) {
            Ok(t) => t.clone(),
            Err(e) => {
                warn!(error = %e, "Using generic email template");
                generic_template()
            }
        };

        let values = HashMap::from([
            ("name", name.to_string()),
            ("recommendedCourse", rec.recommended_course.clone()),
            ("reasoning", rec.reasoning.clone()),
            ("expectedOutcome", rec.expected_outcome.clone()),
            ("successStory", rec.success_story.clone()),
            ("ctaLink", self.cta_url.clone()),
            ("advisorName", self.advisor_name.clone()),
        ]);
        let roadmap = format_roadmap(&rec.roadmap);

        // Markdown is applied to the template only, so values are never
        // reinterpreted as markup. The roadmap is our own markdown and is
        // rendered separately for each format.
        let mut text_values = values.clone();
        text_values.insert("detailedRoadmap", strip_markdown(&roadmap));
        let mut html_values: HashMap<&str, String> = values
            .iter()
            .map(|(key, value)| (*key, escape_html(value).replace('\n', "<br>")))
            .collect();
        html_values.insert("detailedRoadmap", markdown_to_html(&escape_html(&roadmap)));

        let subject = substitute(&strip_markdown(&template.subject), &text_values);
        let text = substitute(&strip_markdown(&template.template), &text_values);
        let content = substitute(&markdown_to_html(&template.template), &html_values);

        if subject.trim().is_empty() || text.trim().is_empty() {
            return Err(RenderError::EmptyOutput(stage.to_string()));
        }

        Ok(RenderedEmail {
            subject,
            content,
            text,
            cta: self.cta_url.clone(),
        })
    }

    fn fallback_email(&self, name: &str) -> RenderedEmail {
        let name = if name.trim().is_empty() { "there" } else { name };
        let text = format!(
            "Hi {name},\n\nThank you for your interest in our AI career programs. \
             We'll be in touch with your personalized recommendations soon.\n\n\
             Learn more: {cta}",
            cta = self.cta_url
        );
        RenderedEmail {
            subject: "Your AI Career Journey".to_string(),
            content: markdown_to_html(&escape_html(&text)),
            text,
            cta: self.cta_url.clone(),
        }
    }
}

/// Replace `{{key}}` with its value. Unknown placeholders are left as-is.
fn substitute(template: &str, values: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Phase-labeled, bulleted roadmap.
pub fn format_roadmap(roadmap: &Roadmap) -> String {
    let mut out = String::new();
    for (i, (label, items)) in roadmap.phases().iter().enumerate() {
        out.push_str(&format!("**Phase {}: {}**\n", i + 1, label));
        for item in items.iter() {
            out.push_str(&format!("• {item}\n"));
        }
        out.push('\n');
    }
    out.push_str(&format!("**Timeline:** {}", roadmap.timeline));
    out
}

fn markdown_to_html(text: &str) -> String {
    let html = BOLD.replace_all(text, "<strong>$1</strong>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    html.replace('\n', "<br>")
}

fn strip_markdown(text: &str) -> String {
    let plain = BOLD.replace_all(text, "$1");
    ITALIC.replace_all(&plain, "$1").into_owned()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::recommend;

    fn renderer(templates: TemplateStore) -> EmailRenderer {
        EmailRenderer::new(
            Arc::new(templates),
            Arc::new(RecommendationEngine::rules_only()),
            "https://example.com/enroll",
            "Sarah",
        )
    }

    #[tokio::test]
    async fn renders_welcome_with_recommendation() {
        let answers = AssessmentAnswers::new().with("interest", "data_science");
        let email = renderer(TemplateStore::embedded())
            .render("welcome", &answers, "Ada")
            .await;

        assert!(email.subject.contains("Ada"));
        assert!(email.content.contains("<strong>Data Science &amp; Analytics</strong>"));
        assert!(email.content.contains("<br>"));
        assert!(!email.content.contains("{{"));
        assert!(email.text.contains("Data Science & Analytics"));
        assert!(!email.text.contains("**"));
        assert_eq!(email.cta, "https://example.com/enroll");
    }

    #[tokio::test]
    async fn unknown_stage_uses_generic_template() {
        let email = renderer(TemplateStore::embedded())
            .render("no_such_stage", &AssessmentAnswers::new(), "Ada")
            .await;
        assert!(!email.subject.is_empty());
        assert!(email.content.contains("AI &amp; Machine Learning"));
    }

    #[tokio::test]
    async fn empty_store_still_renders() {
        let email = renderer(TemplateStore::default())
            .render("welcome", &AssessmentAnswers::new(), "Ada")
            .await;
        assert!(!email.subject.is_empty());
        assert!(!email.content.is_empty());
    }

    #[tokio::test]
    async fn empty_template_degrades_to_fallback() {
        let store =
            TemplateStore::from_json(r#"{"welcome": {"subject": "", "template": ""}}"#).unwrap();
        let email = renderer(store)
            .render("welcome", &AssessmentAnswers::new(), "Ada")
            .await;
        assert_eq!(email.subject, "Your AI Career Journey");
        assert!(email.text.starts_with("Hi Ada"));
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let values = HashMap::from([("name", "Ada".to_string())]);
        assert_eq!(
            substitute("{{name}} / {{mystery}}", &values),
            "Ada / {{mystery}}"
        );
    }

    #[tokio::test]
    async fn markdown_in_values_stays_literal() {
        let email = renderer(TemplateStore::embedded())
            .render("welcome", &AssessmentAnswers::new(), "*Ada* **Lovelace**")
            .await;

        assert!(email.content.contains("Hi *Ada* **Lovelace**,"));
        assert!(!email.content.contains("<em>Ada</em>"));
        assert!(!email.content.contains("<strong>Lovelace</strong>"));
        assert!(email.content.contains("<em>Career Advisor</em>"));
        assert!(email.text.starts_with("Hi *Ada* **Lovelace**,"));
        assert!(email.subject.contains("*Ada*"));
    }

    #[tokio::test]
    async fn roadmap_is_rendered_per_format() {
        let store = TemplateStore::from_json(
            r#"{"assessment_results": {"subject": "Plan", "template": "{{detailedRoadmap}}"}}"#,
        )
        .unwrap();
        let email = renderer(store)
            .render("assessment_results", &AssessmentAnswers::new(), "Ada")
            .await;

        assert!(email.content.starts_with("<strong>Phase 1: "));
        assert!(email.content.contains("<br>• "));
        assert!(email.text.starts_with("Phase 1: "));
        assert!(!email.text.contains("**"));
    }

    #[test]
    fn markdown_pass() {
        assert_eq!(
            markdown_to_html("**bold** and *soft*\nnext"),
            "<strong>bold</strong> and <em>soft</em><br>next"
        );
    }

    #[test]
    fn roadmap_lists_every_phase() {
        let roadmap = recommend(&AssessmentAnswers::new().with("experience", "beginner")).roadmap;
        let rendered = format_roadmap(&roadmap);
        assert!(rendered.starts_with("**Phase 1: Foundation**\n• "));
        assert!(rendered.contains("**Phase 4: Career Launch**"));
        assert!(rendered.ends_with("15 months"));
    }
}
