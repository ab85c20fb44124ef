//! GitLab REST client for creating merge requests

use crate::codehost::{CodeHost, MergeRequestDraft};
use crate::error::CodeHostError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeout for GitLab API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the GitLab client
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    /// Instance URL, e.g. `https://gitlab.example.com`
    pub base_url: String,
    /// Personal access token with `api` scope
    pub token: Option<String>,
    /// Environment variable the token was expected in, for error messages
    pub token_env: String,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gitlab.com".to_string(),
            token: None,
            token_env: "GITLAB_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateMergeRequestBody<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    web_url: String,
}

/// GitLab API client.
///
/// A missing token is only reported when a request is made, so a release
/// can run up to the merge request step and be retried once the token is
/// exported.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    base_url: String,
    token: Option<String>,
    token_env: String,
    http: reqwest::Client,
}

impl GitLabClient {
    /// Create a client
    pub fn new(config: &GitLabConfig) -> Result<Self, CodeHostError> {
        let token = config.token.clone().filter(|t| !t.trim().is_empty());

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("glrelease/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CodeHostError::Network {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            token_env: config.token_env.clone(),
            http,
        })
    }

    fn token(&self) -> Result<&str, CodeHostError> {
        self.token.as_deref().ok_or_else(|| CodeHostError::MissingToken {
            env_var: self.token_env.clone(),
        })
    }

    fn open_merge_requests_url(&self, draft: &MergeRequestDraft) -> String {
        format!(
            "{}?state=opened&source_branch={}&target_branch={}&per_page=1",
            self.merge_requests_url(&draft.project_id),
            encode_project_id(&draft.source_branch),
            encode_project_id(&draft.target_branch)
        )
    }

    fn merge_requests_url(&self, project_id: &str) -> String {
        format!(
            "{}/api/v4/projects/{}/merge_requests",
            self.base_url,
            encode_project_id(project_id)
        )
    }
}

impl CodeHost for GitLabClient {
    async fn create_merge_request(&self, draft: &MergeRequestDraft) -> Result<String, CodeHostError> {
        let token = self.token()?;
        let url = self.merge_requests_url(&draft.project_id);
        log::debug!("POST {}", url);

        let body = CreateMergeRequestBody {
            source_branch: &draft.source_branch,
            target_branch: &draft.target_branch,
            title: &draft.title,
            description: &draft.description,
        };

        let response = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CodeHostError::Network {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), body));
        }

        let created: MergeRequestResponse =
            response.json().await.map_err(|e| CodeHostError::InvalidResponse {
                reason: e.to_string(),
            })?;

        log::info!("created merge request {}", created.web_url);
        Ok(created.web_url)
    }

    async fn find_open_merge_request(
        &self,
        draft: &MergeRequestDraft,
    ) -> Result<Option<String>, CodeHostError> {
        let token = self.token()?;
        let url = self.open_merge_requests_url(draft);
        log::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", token)
            .send()
            .await
            .map_err(|e| CodeHostError::Network {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), body));
        }

        let open: Vec<MergeRequestResponse> =
            response.json().await.map_err(|e| CodeHostError::InvalidResponse {
                reason: e.to_string(),
            })?;
        Ok(open.into_iter().next().map(|mr| mr.web_url))
    }
}

fn classify_failure(status: u16, body: String) -> CodeHostError {
    if status == 403 && body.contains("insufficient_scope") {
        CodeHostError::InsufficientScope
    } else {
        CodeHostError::Api { status, body }
    }
}

/// Numeric ids are used as-is; project paths are percent-encoded
fn encode_project_id(project_id: &str) -> String {
    let mut encoded = String::with_capacity(project_id.len());
    for byte in project_id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte))
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_reported_on_use() {
        let client = GitLabClient::new(&GitLabConfig::default()).unwrap();
        let draft = MergeRequestDraft {
            project_id: "42".to_string(),
            source_branch: "release/prod-1.2.0".to_string(),
            target_branch: "master".to_string(),
            title: "Release 1.2.0 (PROD)".to_string(),
            description: String::new(),
        };
        assert!(matches!(
            client.create_merge_request(&draft).await,
            Err(CodeHostError::MissingToken { env_var }) if env_var == "GITLAB_TOKEN"
        ));
    }

    #[test]
    fn project_paths_are_encoded() {
        assert_eq!(encode_project_id("42"), "42");
        assert_eq!(encode_project_id("group/sub/app"), "group%2Fsub%2Fapp");
    }

    #[test]
    fn url_uses_trimmed_base() {
        let client = GitLabClient::new(&GitLabConfig {
            base_url: "https://gitlab.example.com/".to_string(),
            token: Some("secret".to_string()),
            ..GitLabConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.merge_requests_url("42"),
            "https://gitlab.example.com/api/v4/projects/42/merge_requests"
        );
    }

    #[test]
    fn open_merge_request_lookup_filters_by_branches() {
        let client = GitLabClient::new(&GitLabConfig {
            base_url: "https://gitlab.example.com".to_string(),
            ..GitLabConfig::default()
        })
        .unwrap();
        let draft = MergeRequestDraft {
            project_id: "group/app".to_string(),
            source_branch: "release/prod-1.2.0".to_string(),
            target_branch: "master".to_string(),
            title: String::new(),
            description: String::new(),
        };
        assert_eq!(
            client.open_merge_requests_url(&draft),
            "https://gitlab.example.com/api/v4/projects/group%2Fapp/merge_requests\
             ?state=opened&source_branch=release%2Fprod-1.2.0&target_branch=master&per_page=1"
        );
    }

    #[test]
    fn scope_errors_are_recognised() {
        assert!(matches!(
            classify_failure(403, r#"{"error":"insufficient_scope"}"#.to_string()),
            CodeHostError::InsufficientScope
        ));
        assert!(matches!(
            classify_failure(409, "conflict".to_string()),
            CodeHostError::Api { status: 409, .. }
        ));
    }
}
