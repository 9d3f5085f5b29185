use crate::config::GithubConfig;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{header, StatusCode};
use tracing::{info, instrument, warn};

/// Push of stored assets to the GitHub contents API
///
/// Best-effort by contract: callers log a failed push and carry on,
/// the record simply omits the remote URL.
pub struct GithubUploader {
    client: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
    branch: String,
}

impl GithubUploader {
    /// Build the uploader when the config enables it and carries a token
    pub fn from_config(config: &GithubConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let Some(token) = config.token.clone() else {
            warn!("github push enabled without a token, disabling");
            return None;
        };
        Some(Self {
            client: reqwest::Client::new(),
            token,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
        })
    }

    /// Create one file in the repository; paths are unique per upload,
    /// so the update branch of the contents API never comes into play
    #[instrument(skip(self, bytes), fields(path = %repo_path, bytes = bytes.len()))]
    pub async fn push(&self, repo_path: &str, bytes: &[u8]) -> Result<String> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/contents/{}",
            self.owner, self.repo, repo_path
        );
        let body = serde_json::json!({
            "message": format!("Upload {repo_path}"),
            "content": BASE64.encode(bytes),
            "branch": self.branch,
        });

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .header(header::USER_AGENT, "folio-media")
            .header(header::ACCEPT, "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .context("Failed to reach the GitHub API")?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub rejected the upload: {status} {detail}");
        }

        let public = self.pages_url(repo_path);
        info!(url = %public, "pushed to GitHub");
        metrics::counter!("media.github.pushed").increment(1);
        Ok(public)
    }

    /// Public URL the file is served from on GitHub Pages
    fn pages_url(&self, repo_path: &str) -> String {
        format!("https://{}.github.io/{}/{}", self.owner, self.repo, repo_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> GithubConfig {
        GithubConfig {
            enabled: true,
            token: Some("ghp_test".to_string()),
            owner: "jane".to_string(),
            repo: "portfolio".to_string(),
            branch: "main".to_string(),
        }
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        assert!(GithubUploader::from_config(&GithubConfig::default()).is_none());

        let mut tokenless = enabled_config();
        tokenless.token = None;
        assert!(GithubUploader::from_config(&tokenless).is_none());
    }

    #[test]
    fn test_pages_url_shape() {
        let uploader = GithubUploader::from_config(&enabled_config()).unwrap();
        assert_eq!(
            uploader.pages_url("assets/videos/video_1.mp4"),
            "https://jane.github.io/portfolio/assets/videos/video_1.mp4"
        );
    }
}
