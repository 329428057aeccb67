// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template registry
//!
//! Seeds the built-in template documents on first boot (never overwriting an
//! operator-edited file), then loads and validates every document in the
//! template directory. A bad document is logged and skipped; it never
//! prevents startup. Loaded templates are immutable for the process lifetime.

use crate::fs;
use garcon_core::{Error, Result, Template, TemplateSummary};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

mod defaults;

/// Immutable snapshot of all valid templates, keyed by id.
#[derive(Clone)]
pub struct TemplateRegistry {
    templates: Arc<HashMap<String, Arc<Template>>>,
}

impl TemplateRegistry {
    /// Seed built-ins and load the registry from `dir`.
    pub async fn load(dir: &Path) -> Result<Self> {
        fs::ensure_dir(dir).await?;

        for template in defaults::builtin() {
            let path = dir.join(format!("{}.yaml", template.id));
            if !fs::exists(&path).await {
                info!(template = %template.id, "seeding built-in template");
                fs::write_yaml(&path, &template).await?;
            }
        }

        let mut templates = HashMap::new();
        for path in fs::list_files(dir, Some("yaml")).await? {
            let template: Template = match fs::read_yaml(&path).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable template");
                    continue;
                }
            };
            if let Err(e) = template.validate() {
                warn!(path = %path.display(), error = %e, "skipping invalid template");
                continue;
            }
            if templates.insert(template.id.clone(), Arc::new(template)).is_some() {
                warn!(path = %path.display(), "duplicate template id, later file wins");
            }
        }

        info!(count = templates.len(), "template registry loaded");
        Ok(Self { templates: Arc::new(templates) })
    }

    /// Construct directly from templates (test setups).
    pub fn from_templates(templates: Vec<Template>) -> Self {
        let map = templates.into_iter().map(|t| (t.id.clone(), Arc::new(t))).collect();
        Self { templates: Arc::new(map) }
    }

    /// All templates as trimmed summaries, sorted by id.
    pub fn list(&self) -> Vec<TemplateSummary> {
        let mut out: Vec<_> = self.templates.values().map(|t| t.summary()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Fetch a template by id.
    pub fn get(&self, id: &str) -> Result<Arc<Template>> {
        self.templates.get(id).cloned().ok_or_else(|| Error::not_found("template", id))
    }

    /// Best-effort lookup for cached display rows.
    pub fn lookup(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.get(id).cloned()
    }
}

#[cfg(test)]
#[path = "templates_tests.rs"]
mod tests;
