//! Domain types shared by every tmpldir crate.
//!
//! All path fields use `PathBuf`, relative to the root of the tree they
//! belong to.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Filename suffix that marks a file as a template.
pub const TEMPLATE_MARKER: &str = ".template";

// ---------------------------------------------------------------------------
// ContextValue
// ---------------------------------------------------------------------------

/// A single substitution value.
///
/// Serializes untagged, so a template sees `{{ .Count }}` as `42` and
/// `{{ .User.login }}` as a plain nested lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up `key` when this value is a map.
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        match self {
            ContextValue::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Convert a JSON document. `null` yields `None`; `null` members of
    /// objects and arrays are dropped.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ContextValue::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(ContextValue::Int(i)),
                None => n.as_f64().map(ContextValue::Float),
            },
            Value::String(s) => Some(ContextValue::String(s)),
            Value::Array(items) => Some(ContextValue::List(
                items.into_iter().filter_map(ContextValue::from_json).collect(),
            )),
            Value::Object(fields) => Some(ContextValue::Map(
                fields
                    .into_iter()
                    .filter_map(|(k, v)| ContextValue::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_owned())
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        ContextValue::Int(i)
    }
}

impl From<f64> for ContextValue {
    fn from(f: f64) -> Self {
        ContextValue::Float(f)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<BTreeMap<String, ContextValue>> for ContextValue {
    fn from(m: BTreeMap<String, ContextValue>) -> Self {
        ContextValue::Map(m)
    }
}

// ---------------------------------------------------------------------------
// RenderContext
// ---------------------------------------------------------------------------

/// The substitution values for one run.
///
/// There is no mutable access once built: every render in a run borrows the
/// same instance, so it must stay read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderContext {
    values: BTreeMap<String, ContextValue>,
}

impl RenderContext {
    /// Start building a context.
    pub fn builder() -> RenderContextBuilder {
        RenderContextBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for RenderContext
where
    K: Into<String>,
    V: Into<ContextValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RenderContext {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Pretty JSON, for logs and debugging output.
impl fmt::Display for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.values).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Accumulates values before a run. Later inserts override earlier ones.
#[derive(Debug, Default)]
pub struct RenderContextBuilder {
    values: BTreeMap<String, ContextValue>,
}

impl RenderContextBuilder {
    pub fn insert(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn extend<K, V>(mut self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ContextValue>,
    {
        self.values
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn build(self) -> RenderContext {
        RenderContext {
            values: self.values,
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// One discovered template file, relative to the source tree root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateTask(pub PathBuf);

impl TemplateTask {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for TemplateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl From<PathBuf> for TemplateTask {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

impl From<&str> for TemplateTask {
    fn from(s: &str) -> Self {
        Self(PathBuf::from(s))
    }
}

/// Where a task's rendered output goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputSpec {
    /// Template path in the source tree.
    pub source: PathBuf,
    /// Rendered file path in the destination tree.
    pub destination: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_later_insert_wins() {
        let ctx = RenderContext::builder()
            .insert("Count", 1_i64)
            .insert("Count", 42_i64)
            .build();
        assert_eq!(ctx.get("Count"), Some(&ContextValue::Int(42)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn serializes_untagged() {
        let ctx = RenderContext::builder()
            .insert("Count", 42_i64)
            .insert("Name", "tmpldir")
            .insert("Ok", true)
            .build();
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value, json!({"Count": 42, "Name": "tmpldir", "Ok": true}));
    }

    #[test]
    fn from_json_drops_nulls_and_keeps_nesting() {
        let value = ContextValue::from_json(json!({
            "login": "parro-it",
            "bio": null,
            "public_repos": 12,
            "score": 1.5,
            "topics": ["go", null, "templates"],
        }))
        .unwrap();

        assert_eq!(value.get("login").and_then(ContextValue::as_str), Some("parro-it"));
        assert!(value.get("bio").is_none());
        assert_eq!(value.get("public_repos"), Some(&ContextValue::Int(12)));
        assert_eq!(value.get("score"), Some(&ContextValue::Float(1.5)));
        assert_eq!(
            value.get("topics"),
            Some(&ContextValue::List(vec!["go".into(), "templates".into()]))
        );
    }

    #[test]
    fn display_is_pretty_json() {
        let ctx: RenderContext = [("RepoName", "templatedir")].into_iter().collect();
        let shown = ctx.to_string();
        assert!(shown.contains("\"RepoName\": \"templatedir\""), "got: {shown}");
    }
}
