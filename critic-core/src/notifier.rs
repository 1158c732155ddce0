//! Review-system notes for pull and merge requests.

use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};
use reqwest::blocking::Client;

use crate::error::{CriticError, Result};
use crate::note::{NoteContext, render_note};

/// Default request timeout for review-system calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Posts a rendered note on a review request.
#[cfg_attr(test, mockall::automock)]
pub trait ReviewClient {
    /// Post `body` as a comment on pull/merge request `request_id`.
    fn post_note(&self, request_id: u64, body: &str) -> Result<()>;
}

/// Supported review systems.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReviewSystem {
    /// GitHub pull requests.
    GitHub,
    /// GitLab merge requests.
    GitLab,
}

impl FromStr for ReviewSystem {
    type Err = CriticError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ReviewSystem::GitHub),
            "gitlab" => Ok(ReviewSystem::GitLab),
            other => Err(CriticError::Notification(format!(
                "unknown review system {other:?}"
            ))),
        }
    }
}

/// Credentials and endpoint for one review system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSettings {
    /// Which system to talk to.
    pub system: ReviewSystem,
    /// API base URL.
    pub api_url: String,
    /// Access token.
    pub token: String,
    /// `owner/name` on GitHub, numeric id or `group/project` on GitLab.
    pub project: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl ReviewSettings {
    /// Read settings from environment variables.
    ///
    /// Returns a notification error naming the missing variable when the
    /// review system is not fully configured.
    pub fn from_env() -> Result<Self> {
        let system = match std::env::var("CRITIC_REVIEW_SYSTEM") {
            Ok(value) => value.parse()?,
            Err(_) if std::env::var("GITHUB_TOKEN").is_ok() => ReviewSystem::GitHub,
            Err(_) if std::env::var("GITLAB_TOKEN").is_ok() => ReviewSystem::GitLab,
            Err(_) => {
                return Err(CriticError::Notification(
                    "no review system configured".to_string(),
                ));
            }
        };
        let timeout = Duration::from_secs(timeout_secs());
        let user_agent =
            std::env::var("GITHUB_USER_AGENT").unwrap_or_else(|_| "critic".to_string());

        match system {
            ReviewSystem::GitHub => Ok(Self {
                system,
                api_url: std::env::var("GITHUB_API_URL")
                    .unwrap_or_else(|_| "https://api.github.com".to_string()),
                token: required_env("GITHUB_TOKEN")?,
                project: required_env("GITHUB_REPOSITORY")?,
                user_agent,
                timeout,
            }),
            ReviewSystem::GitLab => Ok(Self {
                system,
                api_url: std::env::var("GITLAB_URL")
                    .unwrap_or_else(|_| "https://gitlab.com".to_string()),
                token: required_env("GITLAB_TOKEN")?,
                project: required_env("GITLAB_PROJECT")?,
                user_agent,
                timeout,
            }),
        }
    }

    /// Build the client for the configured system.
    pub fn client(&self) -> Result<Box<dyn ReviewClient>> {
        match self.system {
            ReviewSystem::GitHub => Ok(Box::new(GitHubReviewClient::new(self)?)),
            ReviewSystem::GitLab => Ok(Box::new(GitLabReviewClient::new(self)?)),
        }
    }
}

/// GitHub issue-comment client.
#[derive(Debug, Clone)]
pub struct GitHubReviewClient {
    base_url: String,
    token: String,
    owner: String,
    name: String,
    user_agent: String,
    client: Client,
}

impl GitHubReviewClient {
    /// Create a client; `settings.project` must be `owner/name`.
    pub fn new(settings: &ReviewSettings) -> Result<Self> {
        let (owner, name) = settings
            .project
            .trim()
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
            .ok_or_else(|| {
                CriticError::Notification(format!(
                    "GITHUB_REPOSITORY must be owner/name, got {:?}",
                    settings.project
                ))
            })?;
        Ok(Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            owner: owner.to_string(),
            name: name.to_string(),
            user_agent: settings.user_agent.clone(),
            client: build_client(settings.timeout)?,
        })
    }
}

impl ReviewClient for GitHubReviewClient {
    fn post_note(&self, request_id: u64, body: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/issues/{request_id}/comments",
            self.base_url, self.owner, self.name
        );
        let response = self
            .client
            .post(url)
            .header("User-Agent", &self.user_agent)
            .header("Authorization", format!("token {}", self.token))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .map_err(|err| CriticError::Notification(format!("github request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(CriticError::Notification(format!(
                "github api error ({status}): {body}"
            )));
        }
        Ok(())
    }
}

/// GitLab merge-request note client.
#[derive(Debug, Clone)]
pub struct GitLabReviewClient {
    base_url: String,
    token: String,
    project: String,
    user_agent: String,
    client: Client,
}

impl GitLabReviewClient {
    /// Create a client for a project id or path.
    pub fn new(settings: &ReviewSettings) -> Result<Self> {
        let project = settings.project.trim();
        if project.is_empty() {
            return Err(CriticError::Notification(
                "GITLAB_PROJECT is empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            project: project.to_string(),
            user_agent: settings.user_agent.clone(),
            client: build_client(settings.timeout)?,
        })
    }

    fn notes_url(&self, request_id: u64) -> String {
        format!(
            "{}/api/v4/projects/{}/merge_requests/{request_id}/notes",
            self.base_url,
            urlencoding::encode(&self.project)
        )
    }
}

impl ReviewClient for GitLabReviewClient {
    fn post_note(&self, request_id: u64, body: &str) -> Result<()> {
        let url = self.notes_url(request_id);
        let response = self
            .client
            .post(url)
            .header("User-Agent", &self.user_agent)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .map_err(|err| CriticError::Notification(format!("gitlab request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(CriticError::Notification(format!(
                "gitlab api error ({status}): {body}"
            )));
        }
        Ok(())
    }
}

/// Renders notes and hands them to a review client.
pub struct Notifier {
    client: Box<dyn ReviewClient>,
    template: Option<String>,
}

impl Notifier {
    /// Create a notifier using the built-in note.
    pub fn new(client: Box<dyn ReviewClient>) -> Self {
        Self {
            client,
            template: None,
        }
    }

    /// Use a repository note template instead of the built-in note.
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// Render and post the note for `request_id`.
    pub fn notify(&self, request_id: u64, context: &NoteContext) -> Result<()> {
        let body = render_note(self.template.as_deref(), context);
        self.client.post_note(request_id, &body)?;
        info!("posted comparison note on request {request_id}");
        Ok(())
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| CriticError::Notification(format!("http client setup failed: {err}")))
}

fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(CriticError::Notification(format!("{key} is required"))),
    }
}

fn timeout_secs() -> u64 {
    let Ok(value) = std::env::var("CRITIC_NOTIFY_TIMEOUT_SECS") else {
        return DEFAULT_TIMEOUT_SECS;
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => secs,
        _ => {
            warn!("ignoring CRITIC_NOTIFY_TIMEOUT_SECS={value}; using {DEFAULT_TIMEOUT_SECS}s");
            DEFAULT_TIMEOUT_SECS
        }
    }
}
