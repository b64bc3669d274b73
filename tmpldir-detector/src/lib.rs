//! Render context detection for `tmpldir-detector`.
//!
//! [`ContextProvider::detect`] assembles the values templates can use:
//!
//! - every process environment variable, as a string;
//! - `Author`, `RepoName`, `Root` - repository identity, taken from GitHub
//!   Actions metadata when present, else from the `origin` remote of the
//!   local git checkout;
//! - `User`, `Repo` - GitHub profile and repository metadata, only when
//!   `GITHUB_TOKEN` is set. Fields are reachable by API key (`html_url`) and
//!   by Go field name (`HTMLURL`), see [`forge::go_field_name`].

pub mod forge;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tmpldir_core::RenderContext;

use crate::forge::{GitHubClient, GITHUB_API};

/// Snapshot of environment variables.
pub type Env = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Identity of the repository being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    /// Owner of the repository (user or organisation login).
    pub author: String,
    pub repo_name: String,
    /// Local checkout root.
    pub root: PathBuf,
}

/// Errors from context detection.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot determine repository: `git remote get-url origin` failed in {dir}: {output}")]
    MissingRemote { dir: PathBuf, output: String },

    #[error("cannot determine repository: unknown provider for remote '{url}'")]
    UnknownProvider { url: String },

    #[error("cannot determine repository: malformed remote '{url}'")]
    MalformedRemote { url: String },

    #[error("GitHub API request to {url} failed: {message}")]
    Forge { url: String, message: String },
}

// ---------------------------------------------------------------------------
// ContextProvider
// ---------------------------------------------------------------------------

/// Builds the [`RenderContext`] for a run from an environment snapshot.
#[derive(Debug, Clone)]
pub struct ContextProvider {
    env: Env,
    api_base: String,
}

impl ContextProvider {
    /// Provider over the current process environment.
    pub fn from_process() -> Self {
        let env = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self::new(env)
    }

    /// Provider over an explicit environment. `GITHUB_API_URL`, when set,
    /// replaces the public GitHub API endpoint.
    pub fn new(env: Env) -> Self {
        let api_base = env
            .get("GITHUB_API_URL")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| GITHUB_API.to_string());
        Self { env, api_base }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Detect the context for the checkout at `dir`.
    pub fn detect(&self, dir: &Path) -> Result<RenderContext, ContextError> {
        let info = detect_repo(dir, &self.env)?;
        tracing::debug!(
            "repository {}/{} rooted at {}",
            info.author,
            info.repo_name,
            info.root.display()
        );

        let mut builder = RenderContext::builder()
            .extend(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .insert("Author", info.author.as_str())
            .insert("RepoName", info.repo_name.as_str())
            .insert("Root", info.root.to_string_lossy().into_owned());

        match self.env.get("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
            Some(token) => {
                let client = GitHubClient::with_base_url(token, &self.api_base);
                builder = builder
                    .insert("User", client.user(&info.author)?)
                    .insert("Repo", client.repository(&info.author, &info.repo_name)?);
            }
            None => tracing::debug!("GITHUB_TOKEN not set; skipping GitHub metadata"),
        }

        Ok(builder.build())
    }
}

/// Detect the context for `dir` from the process environment.
pub fn default_context(dir: &Path) -> Result<RenderContext, ContextError> {
    ContextProvider::from_process().detect(dir)
}

// ---------------------------------------------------------------------------
// Repository identity
// ---------------------------------------------------------------------------

/// Detect repository identity: CI metadata first, then the git remote.
pub fn detect_repo(dir: &Path, env: &Env) -> Result<RepoInfo, ContextError> {
    if let Some(info) = repo_info_from_ci(env) {
        return Ok(info);
    }
    repo_info_from_git(dir)
}

/// Identity from GitHub Actions variables (`GITHUB_REPOSITORY=owner/name`,
/// `GITHUB_WORKSPACE`).
pub fn repo_info_from_ci(env: &Env) -> Option<RepoInfo> {
    let slug = env.get("GITHUB_REPOSITORY").filter(|s| !s.is_empty())?;
    let (author, repo_name) = slug.split_once('/')?;
    Some(RepoInfo {
        author: author.to_string(),
        repo_name: repo_name.to_string(),
        root: env
            .get("GITHUB_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_default(),
    })
}

/// Identity from `git remote get-url origin` run in `dir`.
pub fn repo_info_from_git(dir: &Path) -> Result<RepoInfo, ContextError> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(dir)
        .output()?;

    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        return Err(ContextError::MissingRemote {
            dir: dir.to_path_buf(),
            output: text.trim().to_string(),
        });
    }

    let url = String::from_utf8_lossy(&output.stdout);
    let (author, repo_name) = parse_remote_url(&url)?;
    Ok(RepoInfo {
        author,
        repo_name,
        root: dir.to_path_buf(),
    })
}

/// Split a GitHub remote URL into `(owner, name)`.
///
/// Accepts `https://github.com/owner/name`, `git@github.com:owner/name` and
/// `ssh://git@github.com/owner/name`, each with or without `.git`.
pub fn parse_remote_url(url: &str) -> Result<(String, String), ContextError> {
    const PREFIXES: &[&str] = &[
        "https://github.com/",
        "git@github.com:",
        "ssh://git@github.com/",
    ];

    let url = url.trim();
    let path = PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .ok_or_else(|| ContextError::UnknownProvider {
            url: url.to_string(),
        })?;

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    match path.split('/').collect::<Vec<_>>().as_slice() {
        [owner, name] if !owner.is_empty() && !name.is_empty() => {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(ContextError::MalformedRemote {
            url: url.to_string(),
        }),
    }
}
