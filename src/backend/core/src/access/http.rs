//! Access reviews against the platform authorization API.

use super::{AccessReviewer, AccessSet, ReviewAction};
use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Path of the cluster-scoped resource access review endpoint.
pub const RESOURCE_ACCESS_REVIEW_PATH: &str =
    "/apis/authorization.openshift.io/v1/resourceaccessreviews";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceAccessReview<'a> {
    kind: &'static str,
    api_version: &'static str,
    verb: &'a str,
    resource: &'a str,
    #[serde(rename = "resourceAPIGroup")]
    resource_api_group: &'a str,
    #[serde(rename = "resourceAPIVersion")]
    resource_api_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl<'a> From<&'a ReviewAction> for ResourceAccessReview<'a> {
    fn from(action: &'a ReviewAction) -> Self {
        Self {
            kind: "ResourceAccessReview",
            api_version: "authorization.openshift.io/v1",
            verb: &action.verb,
            resource: &action.resource,
            resource_api_group: &action.group,
            resource_api_version: &action.version,
            namespace: action.namespace.as_deref(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceAccessReviewResponse {
    #[serde(default)]
    users: Option<Vec<String>>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    evaluation_error: Option<String>,
}

/// Reviewer that POSTs `ResourceAccessReview`s to the platform API.
pub struct HttpAccessReviewer {
    client: Client,
    url: String,
    bearer_token: Option<String>,
}

impl HttpAccessReviewer {
    pub fn new(endpoint: &str, bearer_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AuthzError::configuration("Failed to create access review client")
                .with_internal_message(e.to_string())
        })?;

        Ok(Self {
            client,
            url: format!(
                "{}{}",
                endpoint.trim_end_matches('/'),
                RESOURCE_ACCESS_REVIEW_PATH
            ),
            bearer_token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AccessReviewer for HttpAccessReviewer {
    async fn review(&self, action: &ReviewAction) -> Result<AccessSet> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&ResourceAccessReview::from(action));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthzError::access_review(format!(
                "Access review for {} returned {}",
                action, status
            ))
            .with_internal_message(body));
        }

        let review: ResourceAccessReviewResponse = resp.json().await?;
        if let Some(err) = review.evaluation_error.filter(|e| !e.is_empty()) {
            // Partial answers are still usable.
            warn!(
                action = %action,
                error = %err,
                "Access review reported an evaluation error, using partial answer"
            );
        }

        Ok(AccessSet::new(
            review.users.unwrap_or_default(),
            review.groups.unwrap_or_default(),
        ))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
