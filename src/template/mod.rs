//! Rendering of file templates
//!
//! Templates are looked up relative to a root directory (`./templates` by
//! default) and rendered with handlebars in strict mode, so a reference to an
//! undefined variable is an error rather than an empty string.

use handlebars::Handlebars;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_TEMPLATE_DIR: &str = "templates";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template {path} not found")]
    NotFound { path: String },

    #[error("Failed to render template {path}: {reason}")]
    Render { path: String, reason: String },
}

/// Renders a template path with a context into a string
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_path: &str, context: &Value) -> Result<String, TemplateError>;
}

pub struct HandlebarsRenderer {
    root: PathBuf,
    handlebars: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        Self {
            root: root.into(),
            handlebars,
        }
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_DIR)
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template_path: &str, context: &Value) -> Result<String, TemplateError> {
        let path = self.root.join(template_path);
        let source = std::fs::read_to_string(&path).map_err(|_| TemplateError::NotFound {
            path: path.display().to_string(),
        })?;

        self.handlebars
            .render_template(&source, context)
            .map_err(|e| TemplateError::Render {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn renderer_with(name: &str, content: &str) -> (TempDir, HandlebarsRenderer) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        let renderer = HandlebarsRenderer::new(dir.path());
        (dir, renderer)
    }

    #[test]
    fn test_render_with_context() {
        let (_dir, renderer) = renderer_with("motd.hbs", "Welcome to {{host}}");
        let rendered = renderer
            .render("motd.hbs", &json!({ "host": "web-1" }))
            .unwrap();
        assert_eq!(rendered, "Welcome to web-1");
    }

    #[test]
    fn test_undefined_variable_names_the_template() {
        let (_dir, renderer) = renderer_with("motd.hbs", "Welcome to {{missing}}");
        match renderer.render("motd.hbs", &json!({})) {
            Err(TemplateError::Render { path, .. }) => assert!(path.ends_with("motd.hbs")),
            other => panic!("expected render error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_template() {
        let (_dir, renderer) = renderer_with("a.hbs", "");
        assert!(matches!(
            renderer.render("b.hbs", &json!({})),
            Err(TemplateError::NotFound { .. })
        ));
    }
}
