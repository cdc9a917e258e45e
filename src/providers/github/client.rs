use log::{debug, info};
use serde_json::json;

use crate::error::Result;
use crate::http::{ApiClient, ApiResponse, Auth, RetryPolicy};
use crate::upsert::Upsert;

/// GitHub REST v3 client (github.com or an Enterprise `/api/v3` root).
pub struct GitHubClient {
    pub(super) api: ApiClient,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: &str, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(api_url, Auth::Bearer(token.to_string()), retry)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    /// Create `org/name` unless it already exists.
    pub async fn ensure_repository(&self, org: &str, name: &str, private: bool) -> Result<Upsert<()>> {
        let existing = self.api.get(&format!("repos/{org}/{name}")).await?;
        if existing.is_success() {
            debug!("Repository {org}/{name} already exists");
            return Ok(Upsert::AlreadyExists(()));
        }
        if !matches!(existing.status, 301 | 302 | 404) {
            existing.error_for_status()?;
        }

        let payload = json!({
            "name": name,
            "private": private,
            "auto_init": false,
            "has_issues": true,
            "has_wiki": true,
        });
        let response = self.api.post(&format!("orgs/{org}/repos"), &payload).await?;
        let outcome = create_outcome(response)?;
        if matches!(outcome, Upsert::Created(())) {
            info!("Created repository {org}/{name}");
        }
        Ok(outcome)
    }
}

/// Map a create response onto the find-or-create outcome; a 422 reporting a
/// duplicate is `AlreadyExists`, any other failure status is an error.
pub(super) fn create_outcome(response: ApiResponse) -> Result<Upsert<()>> {
    match response.error_for_status() {
        Ok(_) => Ok(Upsert::Created(())),
        Err(e) if e.is_already_exists() => Ok(Upsert::AlreadyExists(())),
        Err(e) => Err(e),
    }
}
