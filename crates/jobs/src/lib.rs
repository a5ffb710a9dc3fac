pub mod analysis;
pub mod dispatch;
mod error;
mod jobs;
pub mod process;
#[cfg(test)]
mod test_support;
pub mod workspace;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use apalis::{
    layers::retry::{
        HasherRng, RetryPolicy,
        backoff::{ExponentialBackoffMaker, MakeBackoff},
    },
    prelude::*,
};
use apalis_codec::json::JsonCodec;
use apalis_sqlite::{CompactType, SqliteStorage, fetcher::SqliteFetcher};
use dispatch::{AI_REVIEW_QUEUE, JobDispatcher, LINT_SECURITY_QUEUE};
pub use error::JobError;
pub use jobs::{
    AI_REVIEW_BANNER, AiReviewJob, LintSecurityJob, QueuedPullRequest, format_review_comment,
    process_ai_review_job, process_lint_security_job, run_ai_review, run_lint_security,
};
use pullcheck_ai::AiClient;
use pullcheck_core::config::{Config, QueueConfig};
use pullcheck_github::GitHub;
use process::ProcessRunner;
use sqlx::{Sqlite, migrate::MigrateDatabase, sqlite::SqlitePool};

/// Shared context available to all job handlers.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<Config>,
    pub github: Arc<GitHub>,
    pub reviewer: Arc<AiClient>,
    pub runner: Arc<ProcessRunner>,
}

/// Type alias for the default codec used by SqliteStorage.
type DefaultCodec = JsonCodec<CompactType>;

/// Type alias for AI review storage.
pub type AiReviewStorage = SqliteStorage<AiReviewJob, DefaultCodec, SqliteFetcher>;

/// Type alias for lint/security storage.
pub type LintSecurityStorage = SqliteStorage<LintSecurityJob, DefaultCodec, SqliteFetcher>;

/// Storage handles for pushing jobs from request handlers.
#[derive(Clone)]
pub struct JobStorage {
    ai_review: AiReviewStorage,
    lint_security: LintSecurityStorage,
}

impl JobStorage {
    /// Set up job storage tables and create storage instances.
    pub async fn setup(queue: &QueueConfig) -> Result<Arc<Self>> {
        if !Sqlite::database_exists(&queue.url).await.unwrap_or(false) {
            tracing::info!(url = %queue.url, "Creating database");
            Sqlite::create_database(&queue.url).await.context("Failed to create database")?;
            tracing::info!("Database created");
        }
        let pool = SqlitePool::connect(&queue.url).await.context("Failed to connect to database")?;
        SqliteStorage::setup(&pool).await.context("Failed to set up job tables")?;
        Ok(Arc::new(Self {
            ai_review: create_storage(&pool, AI_REVIEW_QUEUE),
            lint_security: create_storage(&pool, LINT_SECURITY_QUEUE),
        }))
    }

    /// Get a clone of the AI review storage for pushing jobs.
    pub fn ai_review(&self) -> AiReviewStorage { self.ai_review.clone() }

    /// Get a clone of the lint/security storage for pushing jobs.
    pub fn lint_security(&self) -> LintSecurityStorage { self.lint_security.clone() }

    /// A dispatcher that enqueues onto both queues.
    pub fn dispatcher(&self) -> JobDispatcher {
        JobDispatcher::new(self.ai_review(), self.lint_security())
    }
}

fn create_storage<T>(
    pool: &SqlitePool,
    namespace: &str,
) -> SqliteStorage<T, DefaultCodec, SqliteFetcher> {
    let config = apalis_sqlite::Config::new(namespace).with_poll_interval(
        StrategyBuilder::new()
            .apply(
                IntervalStrategy::new(Duration::from_millis(100))
                    .with_backoff(BackoffConfig::new(Duration::from_secs(1))),
            )
            .build(),
    );
    SqliteStorage::new_with_config(pool, &config)
}

/// Only failures the worker itself reports as transient are retried.
fn should_retry(e: &BoxDynError) -> bool {
    if e.downcast_ref::<AbortError>().is_some() {
        return false;
    }
    e.downcast_ref::<JobError>().is_none_or(JobError::is_retryable)
}

/// Create the job monitor with both workers.
pub fn create_monitor(
    storage: Arc<JobStorage>,
    context: JobContext,
    config: &QueueConfig,
) -> Result<Monitor> {
    let &QueueConfig {
        ai_review_concurrency, lint_security_concurrency, retry_attempts, ..
    } = config;

    let backoff = ExponentialBackoffMaker::new(
        Duration::from_secs(1),
        Duration::from_secs(120),
        1.25,
        HasherRng::default(),
    )
    .map_err(|e| anyhow!("Invalid retry backoff: {e}"))?
    .make_backoff();
    let retry_policy =
        RetryPolicy::retries(retry_attempts).with_backoff(backoff).retry_if(should_retry);

    let storage1 = storage.clone();
    let storage2 = storage;
    let ctx1 = context.clone();
    let ctx2 = context;
    let retry1 = retry_policy.clone();
    let retry2 = retry_policy;

    Ok(Monitor::new()
        .register(move |_| {
            WorkerBuilder::new("ai-review-worker")
                .backend(storage1.ai_review.clone())
                .retry(retry1.clone())
                .enable_tracing()
                .catch_panic()
                .concurrency(ai_review_concurrency)
                .data(ctx1.clone())
                .build(process_ai_review_job)
        })
        .register(move |_| {
            WorkerBuilder::new("lint-security-worker")
                .backend(storage2.lint_security.clone())
                .retry(retry2.clone())
                .enable_tracing()
                .catch_panic()
                .concurrency(lint_security_concurrency)
                .data(ctx2.clone())
                .build(process_lint_security_job)
        })
        .shutdown_timeout(Duration::from_secs(30)))
}
