use crate::domain::policy::MessageTemplates;
use crate::domain::Decision;

const MISSING_FIELDS_PLACEHOLDER: &str = "{missing_fields}";

/// Renders the outbound scheduler message for a decision.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    templates: MessageTemplates,
}

impl MessageCatalog {
    pub fn new(templates: MessageTemplates) -> Self {
        MessageCatalog { templates }
    }

    /// Template for the decision, or the `human_review` template, or the
    /// fallback text. `{missing_fields}` is replaced with the comma-separated
    /// list, or removed when there is none.
    pub fn render(&self, decision: Decision, missing_fields: &[&str]) -> String {
        let template = self
            .templates
            .templates
            .get(decision.as_str())
            .or_else(|| self.templates.templates.get(Decision::HumanReview.as_str()))
            .unwrap_or(&self.templates.fallback);

        template.replace(MISSING_FIELDS_PLACEHOLDER, &missing_fields.join(", "))
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        MessageCatalog::new(MessageTemplates::default())
    }
}
