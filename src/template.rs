//! Resource templates with placeholder substitution
//!
//! Templates are YAML documents with `$TOKEN` placeholders. Replacement
//! values are an immutable `Replacements` passed into every load, so no test
//! can leak substitutions into another.
//!
//! # Example
//!
//! ```
//! use sfn_e2e::template::{render, Replacements};
//!
//! let replacements = Replacements::new().with("ACTIVITY_NAME", "sfn-activity-1");
//! let text = render("name: $ACTIVITY_NAME", &replacements);
//! assert_eq!(text, "name: sfn-activity-1");
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Template errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse template {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Template {name} has unresolved placeholders: {}", .tokens.join(", "))]
    Unresolved { name: String, tokens: Vec<String> },
}

/// Immutable placeholder values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements(BTreeMap<String, String>);

impl Replacements {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of these replacements with `key` set to `value`
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.insert(key.into(), value.into());
        Self(next)
    }

    /// Copy of these replacements with everything in `other` layered on top
    #[must_use]
    pub fn merged(&self, other: &Replacements) -> Self {
        let mut next = self.0.clone();
        next.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(next)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Replacements {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Substitute `$KEY` placeholders, longest key first
///
/// Longest-first keeps `$NAME` from clobbering the front of `$NAME_SUFFIX`.
#[must_use]
pub fn render(template: &str, replacements: &Replacements) -> String {
    let mut keys: Vec<&String> = replacements.0.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    keys.into_iter().fold(template.to_string(), |text, key| {
        text.replace(&format!("${key}"), &replacements.0[key])
    })
}

/// `$UPPER_CASE` tokens still present in `text`
fn unresolved_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        let after = &rest[pos + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
            .unwrap_or(after.len());
        let token = &after[..len];
        if token.starts_with(|c: char| c.is_ascii_uppercase()) && !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
        rest = &after[len..];
    }

    tokens
}

/// Loads `<dir>/<name>.yaml` templates
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    dir: PathBuf,
}

impl TemplateLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render a template and parse it into a JSON document
    pub fn load(&self, name: &str, replacements: &Replacements) -> Result<Value, TemplateError> {
        let path = self.dir.join(format!("{name}.yaml"));
        if !path.exists() {
            return Err(TemplateError::NotFound(path));
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| TemplateError::Read {
            path: path.clone(),
            source,
        })?;

        let rendered = render(&raw, replacements);
        let tokens = unresolved_tokens(&rendered);
        if !tokens.is_empty() {
            return Err(TemplateError::Unresolved {
                name: name.to_string(),
                tokens,
            });
        }

        debug!(template = %name, path = %path.display(), "Loaded resource template");

        serde_yaml::from_str(&rendered).map_err(|source| TemplateError::Parse {
            name: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_longest_key_first() {
        let r = Replacements::new()
            .with("NAME", "short")
            .with("NAME_SUFFIX", "long");
        assert_eq!(render("$NAME_SUFFIX/$NAME", &r), "long/short");
    }

    #[test]
    fn test_with_does_not_mutate_original() {
        let base = Replacements::new().with("A", "1");
        let derived = base.with("B", "2");
        assert_eq!(base.get("B"), None);
        assert_eq!(derived.get("A"), Some("1"));
        assert_eq!(derived.get("B"), Some("2"));
    }

    #[test]
    fn test_merged_prefers_other() {
        let base: Replacements = [("A", "1"), ("B", "2")].into_iter().collect();
        let top: Replacements = [("B", "3")].into_iter().collect();
        let merged = base.merged(&top);
        assert_eq!(merged.get("A"), Some("1"));
        assert_eq!(merged.get("B"), Some("3"));
    }

    #[test]
    fn test_unresolved_tokens() {
        assert_eq!(
            unresolved_tokens("a: $FOO\nb: $BAR_1 $FOO\nc: $lower $ 5$"),
            vec!["FOO".to_string(), "BAR_1".to_string()]
        );
        assert!(unresolved_tokens("plain text").is_empty());
    }

    #[test]
    fn test_load_renders_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("activity.yaml"),
            "apiVersion: sfn.services.k8s.aws/v1alpha1\nkind: Activity\nmetadata:\n  name: $ACTIVITY_NAME\nspec:\n  name: $ACTIVITY_NAME\n",
        )
        .unwrap();

        let loader = TemplateLoader::new(dir.path());
        let doc = loader
            .load("activity", &Replacements::new().with("ACTIVITY_NAME", "sfn-activity-1"))
            .unwrap();

        assert_eq!(doc["kind"], "Activity");
        assert_eq!(doc["spec"]["name"], "sfn-activity-1");
    }

    #[test]
    fn test_load_reports_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sm.yaml"), "spec:\n  roleARN: $ROLE_ARN\n").unwrap();

        let err = TemplateLoader::new(dir.path())
            .load("sm", &Replacements::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::Unresolved { ref tokens, .. } if tokens == &["ROLE_ARN".to_string()]));
    }

    #[test]
    fn test_load_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let err = TemplateLoader::new(dir.path())
            .load("nope", &Replacements::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[test]
    fn test_bundled_templates_parse() {
        let loader = TemplateLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/resources"));
        let replacements = Replacements::new()
            .with("ACTIVITY_NAME", "a")
            .with("STATE_MACHINE_NAME", "sm")
            .with("SFN_EXECUTION_ROLE_ARN", "arn:aws:iam::1:role/r");

        let activity = loader.load("activity", &replacements).unwrap();
        assert_eq!(activity["spec"]["tags"].as_array().map(Vec::len), Some(3));

        let sm = loader.load("state_machine", &replacements).unwrap();
        assert_eq!(sm["spec"]["roleARN"], "arn:aws:iam::1:role/r");
        assert!(sm["spec"]["definition"].is_string());
    }
}
