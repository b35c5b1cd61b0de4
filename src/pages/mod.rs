//! Server-rendered pages
//!
//! Every template under `templates/` and every asset under `static/` is
//! compiled into the binary. Templates are loaded into one Tera instance at
//! start-up, so a broken template fails the boot instead of a request.

mod error;

pub use error::PageError;

use rust_embed::RustEmbed;
use std::error::Error as _;
use tera::{Context as TeraContext, Tera};

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct Templates;

/// Stylesheets and scripts served under `/static/`
#[derive(RustEmbed)]
#[folder = "static/"]
pub struct StaticAssets;

pub struct PageRenderer {
    tera: Tera,
}

impl PageRenderer {
    /// Parse all embedded templates
    pub fn new() -> Result<Self, PageError> {
        let mut sources = Vec::new();
        for name in Templates::iter() {
            let file = Templates::get(&name).ok_or_else(|| PageError::NotFound(name.to_string()))?;
            let content = String::from_utf8(file.data.into_owned()).map_err(|e| {
                PageError::TemplateError(format!("Template {} is not valid UTF-8: {}", name, e))
            })?;
            sources.push((name.to_string(), content));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(sources)
            .map_err(|e| PageError::TemplateError(chain(&format!("Failed to load templates: {}", e), &e)))?;

        tracing::debug!(count = tera.get_template_names().count(), "page templates loaded");
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, PageError> {
        if !self.has_template(template) {
            return Err(PageError::NotFound(template.to_string()));
        }
        self.tera
            .render(template, context)
            .map_err(|e| PageError::TemplateError(chain(&format!("Failed to render '{}': {}", template, e), &e)))
    }

    /// Render `template`, falling back to `error.html` and then to a bare
    /// HTML page. Never fails.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(template, error = %e, "page render failed");

                let mut error_context = context.clone();
                error_context.insert("message", "Something went wrong while building this page.");
                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(_) => simple_error_page("Something went wrong while building this page."),
                }
            }
        }
    }
}

/// Append every `source()` of a Tera error; the top-level message alone
/// rarely names the offending line
fn chain(message: &str, error: &tera::Error) -> String {
    let mut out = message.to_string();
    let mut source = error.source();
    while let Some(s) = source {
        out.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    out
}

pub fn simple_error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Moodify</title>
</head>
<body style="font-family: sans-serif; max-width: 600px; margin: 50px auto;">
    <h1>Moodify</h1>
    <p>{}</p>
    <p><a href="/">Back to start</a></p>
</body>
</html>"#,
        tera::escape_html(message)
    )
}
