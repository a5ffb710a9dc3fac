use apalis::prelude::*;
use pullcheck_core::{
    clients::{Reviewer, SourceControl},
    models::PullRequestRef,
};
use serde::{Deserialize, Serialize};

use super::{QueuedPullRequest, with_lease};
use crate::{JobContext, JobError};

pub const AI_REVIEW_BANNER: &str = "### 🤖 AI Review Feedback";

/// Job to post an AI review of a pull request's diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AiReviewJob {
    pub pull_request: QueuedPullRequest,
}

impl AiReviewJob {
    pub fn new(pull: &PullRequestRef) -> Self { Self { pull_request: pull.into() } }
}

pub fn format_review_comment(review: &str) -> String { format!("{AI_REVIEW_BANNER}\n{review}") }

/// Process an AI review job: fetch the diff, ask the reviewer, post the
/// review. Nothing is posted unless the reviewer produced a review.
pub async fn process_ai_review_job(job: AiReviewJob, ctx: Data<JobContext>) -> Result<(), JobError> {
    tracing::info!("Processing AI review job for {}", job.pull_request);
    let result = match job.pull_request.validate() {
        Ok(pull) => {
            with_lease(
                ctx.config.queue.lease(),
                run_ai_review(&pull, ctx.github.as_ref(), ctx.reviewer.as_ref()),
            )
            .await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        tracing::error!("AI review for {} failed: {}", job.pull_request, e);
    }
    result
}

pub async fn run_ai_review<S, R>(
    pull: &PullRequestRef,
    scm: &S,
    reviewer: &R,
) -> Result<(), JobError>
where
    S: SourceControl,
    R: Reviewer,
{
    let diff = scm.fetch_diff(pull).await?;
    tracing::info!("Analyzing diff with AI for {} ({} bytes)", pull, diff.len());
    let review = reviewer.review(&diff).await?;
    if review.trim().is_empty() {
        return Err(JobError::EmptyResponse);
    }
    scm.post_comment(pull, &format_review_comment(&review)).await?;
    tracing::info!("AI review completed for {}", pull);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeReviewer, FakeScm, pull};

    #[tokio::test]
    async fn test_posts_banner_and_review() {
        let scm = FakeScm::with_diff("+x=1");
        let reviewer = FakeReviewer::responding("Looks fine.");
        run_ai_review(&pull(), &scm, &reviewer).await.unwrap();

        assert_eq!(reviewer.diffs(), ["+x=1"]);
        let comments = scm.comments();
        assert_eq!(comments.len(), 1);
        let (target, body) = &comments[0];
        assert_eq!(target, &pull());
        assert!(body.starts_with(AI_REVIEW_BANNER));
        assert_eq!(body.strip_prefix(AI_REVIEW_BANNER).unwrap().trim_start(), "Looks fine.");
    }

    #[tokio::test]
    async fn test_empty_review_posts_nothing() {
        let scm = FakeScm::with_diff("+x=1");
        for reviewer in [FakeReviewer::empty(), FakeReviewer::responding("  \n")] {
            let err = run_ai_review(&pull(), &scm, &reviewer).await.unwrap_err();
            assert!(matches!(err, JobError::EmptyResponse), "{err}");
        }
        assert!(scm.comments().is_empty());
    }

    #[tokio::test]
    async fn test_missing_diff_fails_without_comment() {
        let scm = FakeScm::without_diff();
        let reviewer = FakeReviewer::responding("Looks fine.");
        let err = run_ai_review(&pull(), &scm, &reviewer).await.unwrap_err();
        assert!(matches!(err, JobError::DiffUnavailable(_)), "{err}");
        assert!(err.is_retryable());
        assert!(reviewer.diffs().is_empty());
        assert!(scm.comments().is_empty());
    }

    #[tokio::test]
    async fn test_provider_and_post_failures_fail_the_job() {
        let scm = FakeScm::with_diff("+x=1");
        let err = run_ai_review(&pull(), &scm, &FakeReviewer::failing("401 Unauthorized"))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Provider(ref s) if s.contains("401")), "{err}");
        assert!(scm.comments().is_empty());

        let scm = FakeScm::with_diff("+x=1").rejecting_comments();
        let err = run_ai_review(&pull(), &scm, &FakeReviewer::responding("Looks fine."))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::CommentFailure(_)), "{err}");
    }

    #[test]
    fn test_job_payload_is_the_descriptor() {
        let job = AiReviewJob::new(&pull());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json, serde_json::json!({"owner": "octo", "repo": "widgets", "number": 42}));
        assert_eq!(serde_json::from_value::<AiReviewJob>(json).unwrap(), job);

        // Invalid descriptors decode, and are rejected for good by the handler.
        let job: AiReviewJob =
            serde_json::from_str(r#"{"owner":"octo","repo":"","number":42}"#).unwrap();
        let err = job.pull_request.validate().unwrap_err();
        assert!(matches!(err, JobError::InvalidJob(_)), "{err}");
        assert!(!err.is_retryable());
    }
}
