use handlebars::Handlebars;
use serde_json::Value;
use std::sync::Arc;

use crate::core::error::Error as CoreError;
use crate::core::ports::PromptRenderer;

/// Renders judge prompts. Escaping is off since the output is plain text for an LLM.
#[derive(Clone)]
pub struct HandlebarsRenderer {
    engine: Arc<Handlebars<'static>>,
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self {
            engine: Arc::new(handlebars),
        }
    }
}

impl PromptRenderer for HandlebarsRenderer {
    fn render(&self, template: &str, data: &Value) -> crate::core::Result<String> {
        self.engine
            .render_template(template, data)
            .map_err(|e| CoreError::TemplateRendering(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_without_html_escaping() {
        let renderer = HandlebarsRenderer::new();
        let out = renderer
            .render("Q: {{question}}", &json!({"question": "a < b & \"c\""}))
            .unwrap();
        assert_eq!(out, "Q: a < b & \"c\"");
    }

    #[test]
    fn reports_template_syntax_errors() {
        let renderer = HandlebarsRenderer::new();
        let err = renderer.render("{{#each}}", &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::TemplateRendering(_)));
    }
}
