pub mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use octocrab::Octocrab;
use pullcheck_core::{
    clients::{ScmError, SourceControl},
    config::GitHubConfig,
    models::PullRequestRef,
};

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let mut builder = Octocrab::builder().personal_token(config.token.clone());
        if let Some(api_url) = &config.api_url {
            builder = builder.base_uri(api_url.as_str()).context("Invalid GitHub API URL")?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}", profile.login);
        Ok(Arc::new(Self { client }))
    }
}

impl SourceControl for GitHub {
    async fn fetch_diff(&self, pull: &PullRequestRef) -> Result<String, ScmError> {
        self.client.pulls(pull.owner(), pull.repo()).get_diff(pull.number()).await.map_err(|e| {
            tracing::warn!("Failed to fetch diff for {}: {}", pull, e);
            ScmError::DiffUnavailable { pull: pull.clone(), reason: e.to_string() }
        })
    }

    async fn post_comment(&self, pull: &PullRequestRef, body: &str) -> Result<(), ScmError> {
        match self
            .client
            .issues(pull.owner(), pull.repo())
            .create_comment(pull.number(), body)
            .await
        {
            Ok(comment) => {
                tracing::info!("Posted comment {} on {}", comment.id, pull);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to post comment on {}: {}", pull, e);
                Err(ScmError::CommentRejected { pull: pull.clone(), reason: e.to_string() })
            }
        }
    }
}
