use std::{io, time::Duration};

use pullcheck_core::{
    clients::{ReviewError, ScmError},
    models::InvalidPullRequest,
};

/// Reasons a job could not produce its comment.
///
/// Every variant fails the job. Partial results never reach this type: a
/// lint or audit tool that misbehaves is reported inside the posted comment
/// instead (see [`crate::analysis::ToolFailure`]).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid job: {0}")]
    InvalidJob(#[from] InvalidPullRequest),
    #[error("diff unavailable: {0}")]
    DiffUnavailable(String),
    #[error("AI provider error: {0}")]
    Provider(String),
    #[error("AI provider returned an empty review")]
    EmptyResponse,
    #[error("failed to post comment: {0}")]
    CommentFailure(String),
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),
    #[error("clone failed: {0}")]
    CloneFailure(String),
    #[error("dependency install failed: {0}")]
    InstallFailure(String),
    #[error("job exceeded its {0:?} lease")]
    LeaseExpired(Duration),
}

impl JobError {
    /// Whether redelivering the job could succeed.
    pub fn is_retryable(&self) -> bool { !matches!(self, Self::InvalidJob(_)) }
}

impl From<ScmError> for JobError {
    fn from(err: ScmError) -> Self {
        match err {
            ScmError::DiffUnavailable { reason, .. } => Self::DiffUnavailable(reason),
            ScmError::CommentRejected { reason, .. } => Self::CommentFailure(reason),
        }
    }
}

impl From<ReviewError> for JobError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::EmptyResponse => Self::EmptyResponse,
            ReviewError::Provider(reason) => Self::Provider(reason),
        }
    }
}
