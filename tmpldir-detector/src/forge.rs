//! GitHub REST lookups for the extended context fields.
//!
//! Payloads keep the API's snake_case keys and gain the field names of the
//! Go GitHub client next to them, so `{{.Repo.html_url}}` and
//! `{{.Repo.HTMLURL}}` render the same value.

use std::collections::BTreeMap;
use std::time::Duration;

use tmpldir_core::ContextValue;

use crate::ContextError;

/// Public GitHub API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

const TIMEOUT: Duration = Duration::from_secs(30);

/// Key segments Go spells in capitals.
const INITIALISMS: &[&str] = &["api", "html", "id", "ip", "sha", "spdx", "ssh", "svn", "uri", "url"];

/// Minimal authenticated GitHub client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, GITHUB_API)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(TIMEOUT)
            .user_agent(concat!("tmpldir/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// `GET /users/{login}`
    pub fn user(&self, login: &str) -> Result<ContextValue, ContextError> {
        self.get(&format!("{}/users/{login}", self.base_url))
    }

    /// `GET /repos/{owner}/{name}`
    pub fn repository(&self, owner: &str, name: &str) -> Result<ContextValue, ContextError> {
        self.get(&format!("{}/repos/{owner}/{name}", self.base_url))
    }

    fn get(&self, url: &str) -> Result<ContextValue, ContextError> {
        tracing::debug!("GET {url}");
        let forge_err = |message: String| ContextError::Forge {
            url: url.to_string(),
            message,
        };

        let response = self
            .agent
            .get(url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .call()
            .map_err(|e| forge_err(e.to_string()))?;
        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| forge_err(e.to_string()))?;

        ContextValue::from_json(body)
            .map(with_go_field_names)
            .ok_or_else(|| forge_err("empty response body".to_string()))
    }
}

/// Go field name for an API key: `html_url` -> `HTMLURL`, `node_id` -> `NodeID`.
pub fn go_field_name(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if INITIALISMS.contains(&part) {
                return part.to_ascii_uppercase();
            }
            let mut chars = part.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect())
                .unwrap_or_default()
        })
        .collect()
}

/// Copy every map entry under its [`go_field_name`] too, at any depth.
/// Keys from the payload win over aliases.
pub fn with_go_field_names(value: ContextValue) -> ContextValue {
    match value {
        ContextValue::Map(fields) => {
            let mut out = BTreeMap::new();
            for (key, value) in fields {
                let value = with_go_field_names(value);
                let alias = go_field_name(&key);
                if !alias.is_empty() && alias != key {
                    out.entry(alias).or_insert_with(|| value.clone());
                }
                out.insert(key, value);
            }
            ContextValue::Map(out)
        }
        ContextValue::List(items) => {
            ContextValue::List(items.into_iter().map(with_go_field_names).collect())
        }
        other => other,
    }
}
