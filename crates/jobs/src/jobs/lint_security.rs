use std::{future::Future, path::Path};

use apalis::prelude::*;
use pullcheck_core::{clients::SourceControl, config::AnalysisConfig, models::PullRequestRef};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{QueuedPullRequest, command_deadline, with_lease};
use crate::{
    JobContext, JobError,
    analysis::{self, AnalysisReport, ToolFailure},
    process::{CommandRunner, Invocation},
    workspace::Workspace,
};

const CHECKOUT_DIR: &str = "checkout";
const IGNORE_SCRIPTS: &str = "--ignore-scripts";
const OUT_OF_TIME: &str = "did not finish before the job deadline";

/// Job to lint and audit a pull request's repository and post the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LintSecurityJob {
    pub pull_request: QueuedPullRequest,
}

impl LintSecurityJob {
    pub fn new(pull: &PullRequestRef) -> Self { Self { pull_request: pull.into() } }
}

/// Process a lint/security job.
///
/// This handles:
/// - Cloning the repository into a fresh workspace
/// - Installing dependencies with install scripts disabled
/// - Running the linter and the dependency audit
/// - Posting the combined report as a PR comment
///
/// Commands must finish early enough to leave part of the lease for posting,
/// so a hung tool degrades its section instead of expiring the lease.
pub async fn process_lint_security_job(
    job: LintSecurityJob,
    ctx: Data<JobContext>,
) -> Result<(), JobError> {
    tracing::info!("Processing lint/security job for {}", job.pull_request);
    let lease = ctx.config.queue.lease();
    let result = match job.pull_request.validate() {
        Ok(pull) => {
            with_lease(
                lease,
                run_lint_security(
                    &pull,
                    &ctx.config.analysis,
                    ctx.github.as_ref(),
                    ctx.runner.as_ref(),
                    command_deadline(lease),
                ),
            )
            .await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        tracing::error!("Lint/security analysis for {} failed: {}", job.pull_request, e);
    }
    result
}

pub async fn run_lint_security<S, R>(
    pull: &PullRequestRef,
    settings: &AnalysisConfig,
    scm: &S,
    runner: &R,
    deadline: Instant,
) -> Result<(), JobError>
where
    S: SourceControl,
    R: CommandRunner,
{
    let workspace =
        Workspace::create(settings.workspace_root.as_deref()).map_err(JobError::Workspace)?;
    let result = analyze(pull, settings, scm, runner, workspace.path(), deadline).await;
    workspace.destroy().await;
    result
}

async fn analyze<S, R>(
    pull: &PullRequestRef,
    settings: &AnalysisConfig,
    scm: &S,
    runner: &R,
    workspace: &Path,
    deadline: Instant,
) -> Result<(), JobError>
where
    S: SourceControl,
    R: CommandRunner,
{
    let checkout = workspace.join(CHECKOUT_DIR);
    by_deadline(deadline, clone_repository(pull, settings, runner, workspace, &checkout), || {
        JobError::CloneFailure(OUT_OF_TIME.to_string())
    })
    .await?;
    by_deadline(deadline, install_dependencies(pull, settings, runner, &checkout), || {
        JobError::InstallFailure(OUT_OF_TIME.to_string())
    })
    .await?;

    let lint = by_deadline(deadline, analysis::run_lint(runner, &settings.lint, &checkout), || {
        ToolFailure::OutOfTime
    })
    .await;
    match &lint {
        Ok(findings) => tracing::info!("Lint found {} messages in {}", findings.message_count(), pull),
        Err(e) => tracing::warn!("Lint failed for {}: {}", pull, e),
    }
    let security =
        by_deadline(deadline, analysis::run_audit(runner, &settings.audit, &checkout), || {
            ToolFailure::OutOfTime
        })
        .await;
    match &security {
        Ok(findings) => {
            tracing::info!("Audit found {} vulnerabilities in {}", findings.vulnerabilities.len(), pull)
        }
        Err(e) => tracing::warn!("Security scan failed for {}: {}", pull, e),
    }

    let report = AnalysisReport { lint, security };
    scm.post_comment(pull, &report.render()).await?;
    tracing::info!("Completed lint/security analysis for {}", pull);
    Ok(())
}

/// Run a step that must be done by `deadline`. A late step is dropped,
/// which kills whatever it was running.
async fn by_deadline<T, E>(
    deadline: Instant,
    step: impl Future<Output = Result<T, E>>,
    late: impl FnOnce() -> E,
) -> Result<T, E> {
    tokio::time::timeout_at(deadline, step).await.unwrap_or_else(|_| Err(late()))
}

pub fn clone_url(base: &str, pull: &PullRequestRef) -> String {
    format!("{}/{}/{}.git", base.trim_end_matches('/'), pull.owner(), pull.repo())
}

async fn clone_repository<R: CommandRunner>(
    pull: &PullRequestRef,
    settings: &AnalysisConfig,
    runner: &R,
    workspace: &Path,
    checkout: &Path,
) -> Result<(), JobError> {
    let url = clone_url(&settings.clone_base_url, pull);
    let invocation = Invocation {
        program: settings.git.clone(),
        args: vec![
            "clone".to_string(),
            "--depth=1".to_string(),
            "--quiet".to_string(),
            url.clone(),
            checkout.to_string_lossy().into_owned(),
        ],
        working_dir: workspace.to_path_buf(),
    };
    let output =
        runner.run(&invocation).await.map_err(|e| JobError::CloneFailure(e.to_string()))?;
    if !output.success() {
        return Err(JobError::CloneFailure(format!("{url}: {}", output.describe())));
    }
    tracing::info!("Cloned {} into {}", url, checkout.display());
    Ok(())
}

async fn install_dependencies<R: CommandRunner>(
    pull: &PullRequestRef,
    settings: &AnalysisConfig,
    runner: &R,
    checkout: &Path,
) -> Result<(), JobError> {
    if !checkout.join("package.json").is_file() {
        tracing::info!("No package.json in {}, skipping dependency install", pull);
        return Ok(());
    }
    let mut invocation = Invocation::new(&settings.install, checkout);
    if !invocation.args.iter().any(|arg| arg == IGNORE_SCRIPTS) {
        invocation.args.push(IGNORE_SCRIPTS.to_string());
    }
    let output = runner
        .run(&invocation)
        .await
        .map_err(|e| JobError::InstallFailure(e.to_string()))?;
    if !output.success() {
        return Err(JobError::InstallFailure(output.describe()));
    }
    Ok(())
}
