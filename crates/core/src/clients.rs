//! Interfaces to the external collaborators the workers talk to.
//!
//! Workers are generic over these traits so the production adapters
//! (GitHub, the configured AI provider) can be swapped for fakes in tests.

use std::future::Future;

use crate::models::PullRequestRef;

#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("diff unavailable for {pull}: {reason}")]
    DiffUnavailable { pull: PullRequestRef, reason: String },
    #[error("failed to comment on {pull}: {reason}")]
    CommentRejected { pull: PullRequestRef, reason: String },
}

/// Source-control host: diff retrieval and comment posting.
pub trait SourceControl: Send + Sync {
    /// Fetch the unified diff of a pull request.
    fn fetch_diff(
        &self,
        pull: &PullRequestRef,
    ) -> impl Future<Output = Result<String, ScmError>> + Send;

    /// Post `body` verbatim as a new comment on the pull request.
    ///
    /// Implementations do not retry; a rejected post is logged and returned.
    fn post_comment(
        &self,
        pull: &PullRequestRef,
        body: &str,
    ) -> impl Future<Output = Result<(), ScmError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("AI provider returned no content")]
    EmptyResponse,
    #[error("AI provider error: {0}")]
    Provider(String),
}

/// Language-model reviewer: diff text in, review text out.
pub trait Reviewer: Send + Sync {
    fn review(&self, diff: &str) -> impl Future<Output = Result<String, ReviewError>> + Send;
}
