mod ai_review;
mod lint_security;

use std::{fmt, future::Future, time::Duration};

pub use ai_review::{
    AI_REVIEW_BANNER, AiReviewJob, format_review_comment, process_ai_review_job, run_ai_review,
};
pub use lint_security::{LintSecurityJob, process_lint_security_job, run_lint_security};
use pullcheck_core::models::PullRequestRef;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::JobError;

/// Most of a lease that is kept back for posting the comment.
const MAX_POSTING_RESERVE: Duration = Duration::from_secs(15);

/// A pull request as stored in a queue row.
///
/// Decoding accepts any owner, repository and number. A descriptor that
/// fails validation therefore still reaches its handler, which fails it as
/// [`JobError::InvalidJob`] so that it is never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPullRequest {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl From<&PullRequestRef> for QueuedPullRequest {
    fn from(pull: &PullRequestRef) -> Self {
        Self { owner: pull.owner().to_string(), repo: pull.repo().to_string(), number: pull.number() }
    }
}

impl QueuedPullRequest {
    pub fn validate(&self) -> Result<PullRequestRef, JobError> {
        Ok(PullRequestRef::new(self.owner.clone(), self.repo.clone(), self.number)?)
    }
}

impl fmt::Display for QueuedPullRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Bound a job by its lease. A job still running when the lease runs out is
/// dropped, which kills its child processes and removes its workspace, and
/// fails so the queue can redeliver it.
async fn with_lease<F>(lease: Duration, job: F) -> Result<(), JobError>
where F: Future<Output = Result<(), JobError>> {
    tokio::time::timeout(lease, job).await.unwrap_or(Err(JobError::LeaseExpired(lease)))
}

/// When the external commands of a job starting now must be done, so that
/// its result can still be posted inside `lease`. A quarter of the lease, at
/// most [`MAX_POSTING_RESERVE`], is left for posting.
fn command_deadline(lease: Duration) -> Instant {
    Instant::now() + lease - (lease / 4).min(MAX_POSTING_RESERVE)
}
