//! Template rendering environment.
//!
//! Built-in templates are compiled into the crate. A template directory may
//! override any of them by file name (`change.html`, `base.html`, ...).

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::{AdminError, AdminResult};

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("changelist.html", include_str!("../templates/changelist.html")),
    ("add.html", include_str!("../templates/add.html")),
    ("change.html", include_str!("../templates/change.html")),
    ("form_fields.html", include_str!("../templates/form_fields.html")),
    ("error.html", include_str!("../templates/error.html")),
];

pub struct AdminEnvironment {
    tera: Tera,
}

impl AdminEnvironment {
    pub fn new() -> AdminResult<Self> {
        Self::build(BTreeMap::new())
    }

    /// Built-in templates, overridden by the `*.html` files found in `dir`.
    pub fn with_template_dir(dir: &Path) -> AdminResult<Self> {
        let mut overrides = BTreeMap::new();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AdminError::Registration(format!("template dir {}: {e}", dir.display()))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let source = std::fs::read_to_string(&path).map_err(|e| {
                AdminError::Registration(format!("template {}: {e}", path.display()))
            })?;
            tracing::info!("Using template override {}", path.display());
            overrides.insert(name, source);
        }
        Self::build(overrides)
    }

    fn build(overrides: BTreeMap<String, String>) -> AdminResult<Self> {
        let mut sources: BTreeMap<String, String> = BUILTIN_TEMPLATES
            .iter()
            .map(|(name, source)| (name.to_string(), source.to_string()))
            .collect();
        sources.extend(overrides);

        let mut tera = Tera::default();
        tera.add_raw_templates(sources)?;
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, view: &impl Serialize) -> AdminResult<String> {
        let context = Context::from_serialize(view)?;
        Ok(self.tera.render(template, &context)?)
    }
}
