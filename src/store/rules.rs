//! Rule source loading
//!
//! Every `*.yaml` / `*.yml` file in the rules directory may hold several YAML
//! documents, one rule each. A rule's effective name is `{file stem}-{name}`.

use super::records::RuleDocument;
use super::StoreError;
use crate::context::Rule;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Load all rules under `dir` in scan order: file name, then document order.
pub fn load_rules(dir: &Path) -> Result<Vec<Rule>, StoreError> {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "Rules directory not found, no rules loaded");
        return Ok(Vec::new());
    }

    let mut rules = Vec::new();
    let mut seen = HashSet::new();
    for path in rule_files(dir)? {
        let source = source_name(&path);
        let text = fs::read_to_string(&path).map_err(|source| StoreError::io(&path, source))?;

        for document in serde_yaml::Deserializer::from_str(&text) {
            let parsed = Option::<RuleDocument>::deserialize(document).map_err(|e| {
                StoreError::RuleSource {
                    path: path.clone(),
                    source: e,
                }
            })?;
            let Some(doc) = parsed else { continue };

            let rule = qualify(&source, doc)?;
            if !seen.insert(rule.name.clone()) {
                return Err(StoreError::InvalidRule {
                    name: rule.name,
                    reason: "duplicate rule name".to_string(),
                });
            }
            tracing::debug!(rule = %rule.name, steps = rule.steps.len(), "Loaded rule");
            rules.push(rule);
        }
    }

    tracing::info!(path = %dir.display(), count = rules.len(), "Rules loaded");
    Ok(rules)
}

fn rule_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::io(dir, source))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn qualify(source: &str, doc: RuleDocument) -> Result<Rule, StoreError> {
    let name = format!("{source}-{}", doc.name);
    if name.contains(['/', '\\']) {
        return Err(StoreError::InvalidRule {
            name,
            reason: "rule names cannot contain path separators".to_string(),
        });
    }
    if doc.nodes.is_empty() {
        return Err(StoreError::InvalidRule {
            name,
            reason: "rule has no nodes".to_string(),
        });
    }
    Ok(Rule {
        name,
        criteria: doc.criteria,
        index_fields: doc.index,
        steps: doc.nodes,
    })
}
