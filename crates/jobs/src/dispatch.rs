use std::future::Future;

use anyhow::{Context, Result};
use apalis::prelude::TaskSink;
use pullcheck_core::models::PullRequestRef;

use crate::{AiReviewJob, AiReviewStorage, LintSecurityJob, LintSecurityStorage};

pub const AI_REVIEW_QUEUE: &str = "ai-review";
pub const LINT_SECURITY_QUEUE: &str = "lint-security";

/// A queue that durably accepts jobs of type `T`.
pub trait JobSink<T>: Send + Sync {
    fn enqueue(&self, job: T) -> impl Future<Output = Result<()>> + Send;
}

impl JobSink<AiReviewJob> for AiReviewStorage {
    async fn enqueue(&self, job: AiReviewJob) -> Result<()> {
        let mut storage = self.clone();
        storage.push(job).await.context("Failed to push AI review job")?;
        Ok(())
    }
}

impl JobSink<LintSecurityJob> for LintSecurityStorage {
    async fn enqueue(&self, job: LintSecurityJob) -> Result<()> {
        let mut storage = self.clone();
        storage.push(job).await.context("Failed to push lint/security job")?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to enqueue {pull} on {queue}: {reason}")]
pub struct EnqueueError {
    pub queue: &'static str,
    pub pull: PullRequestRef,
    pub reason: String,
}

/// Typed façade over the two review queues.
///
/// Holds no logic beyond turning a pull request into one job per queue; the
/// queues are independent and neither waits on the other's outcome.
#[derive(Clone)]
pub struct Dispatcher<A, L> {
    ai_review: A,
    lint_security: L,
}

/// The dispatcher used by the server, backed by the SQLite job store.
pub type JobDispatcher = Dispatcher<AiReviewStorage, LintSecurityStorage>;

impl<A, L> Dispatcher<A, L>
where
    A: JobSink<AiReviewJob>,
    L: JobSink<LintSecurityJob>,
{
    pub fn new(ai_review: A, lint_security: L) -> Self { Self { ai_review, lint_security } }

    pub async fn enqueue_ai_review(&self, pull: &PullRequestRef) -> Result<(), EnqueueError> {
        self.ai_review
            .enqueue(AiReviewJob::new(pull))
            .await
            .map_err(|e| enqueue_error(AI_REVIEW_QUEUE, pull, e))?;
        tracing::info!("Enqueued {} on {}", pull, AI_REVIEW_QUEUE);
        Ok(())
    }

    pub async fn enqueue_lint_security(&self, pull: &PullRequestRef) -> Result<(), EnqueueError> {
        self.lint_security
            .enqueue(LintSecurityJob::new(pull))
            .await
            .map_err(|e| enqueue_error(LINT_SECURITY_QUEUE, pull, e))?;
        tracing::info!("Enqueued {} on {}", pull, LINT_SECURITY_QUEUE);
        Ok(())
    }

    /// Enqueue both reviews of a pull request. Each enqueue is attempted
    /// regardless of the other; the first failure is returned.
    pub async fn dispatch(&self, pull: &PullRequestRef) -> Result<(), EnqueueError> {
        let lint_security = self.enqueue_lint_security(pull).await;
        let ai_review = self.enqueue_ai_review(pull).await;
        lint_security.and(ai_review)
    }
}

fn enqueue_error(queue: &'static str, pull: &PullRequestRef, err: anyhow::Error) -> EnqueueError {
    tracing::error!("Failed to enqueue {} on {}: {:?}", pull, queue, err);
    EnqueueError { queue, pull: pull.clone(), reason: format!("{err:#}") }
}
