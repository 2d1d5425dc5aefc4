//! Email template store: stage key -> subject + body with `{{placeholder}}` slots.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RenderError;

/// Templates compiled into the binary.
const EMBEDDED_TEMPLATES: &str = include_str!("../../templates/email_templates.json");

/// One template entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub template: String,
}

/// Used when a stage key has no template of its own.
pub fn generic_template() -> EmailTemplate {
    EmailTemplate {
        subject: "Your AI career journey, {{name}}".to_string(),
        template: "Hi {{name}},\n\nBased on your assessment, we recommend **{{recommendedCourse}}**.\n\n\
                   {{reasoning}}\n\nLearn more: {{ctaLink}}\n\n{{advisorName}}"
            .to_string(),
    }
}

/// Read-only, process-wide template map.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateStore {
    /// Parse a JSON template map.
    pub fn from_json(json: &str) -> Result<Self, RenderError> {
        let templates: HashMap<String, EmailTemplate> =
            serde_json::from_str(json).map_err(|e| RenderError::TemplateStore(e.to_string()))?;
        Ok(Self { templates })
    }

    /// The copy compiled into the binary. Empty if it somehow fails to parse.
    pub fn embedded() -> Self {
        Self::from_json(EMBEDDED_TEMPLATES).unwrap_or_else(|e| {
            warn!(error = %e, "Embedded email templates are invalid");
            Self::default()
        })
    }

    /// Load from `path` if given, otherwise the embedded copy.
    /// An unreadable or invalid file logs a warning and uses the embedded copy.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::embedded();
        };

        let loaded = std::fs::read_to_string(path)
            .map_err(|e| RenderError::TemplateStore(format!("{}: {e}", path.display())))
            .and_then(|json| Self::from_json(&json));

        match loaded {
            Ok(store) => {
                info!(path = %path.display(), count = store.len(), "Loaded email templates");
                store
            }
            Err(e) => {
                warn!(error = %e, "Falling back to embedded email templates");
                Self::embedded()
            }
        }
    }

    pub fn get(&self, stage: &str) -> Result<&EmailTemplate, RenderError> {
        self.templates
            .get(stage)
            .ok_or_else(|| RenderError::TemplateMissing(stage.to_string()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_has_every_stage() {
        let store = TemplateStore::embedded();
        for stage in [
            "welcome",
            "assessment_results",
            "success_stories",
            "course_deep_dive",
            "social_proof",
            "final_cta",
        ] {
            assert!(store.get(stage).is_ok(), "missing {stage}");
        }
    }

    #[test]
    fn missing_stage_is_an_error() {
        let store = TemplateStore::embedded();
        assert!(matches!(
            store.get("nope"),
            Err(RenderError::TemplateMissing(s)) if s == "nope"
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"welcome": {{"subject": "Hey", "template": "Body"}}}}"#
        )
        .unwrap();

        let store = TemplateStore::load(Some(file.path()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("welcome").unwrap().subject, "Hey");
    }

    #[test]
    fn bad_file_uses_embedded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let store = TemplateStore::load(Some(file.path()));
        assert_eq!(store.len(), TemplateStore::embedded().len());

        let missing = TemplateStore::load(Some(Path::new("/definitely/not/here.json")));
        assert!(!missing.is_empty());
    }
}
