//! Static analysis and dependency audit of a checked-out repository.
//!
//! Each tool runs independently. A tool that cannot be run, or whose output
//! cannot be understood, yields a [`ToolFailure`] that is rendered into its
//! section of the comment; it never fails the job.

pub mod audit;
pub mod lint;

use std::path::Path;

use pullcheck_core::config::ToolCommand;

pub use self::{audit::AuditFindings, lint::LintFindings};
use crate::process::{CommandRunner, Invocation, ProcessError};

pub const ANALYSIS_BANNER: &str = "### 🤖 Automated Analysis";

/// GitHub rejects comments longer than this many characters.
pub const MAX_COMMENT_CHARS: usize = 65_536;

/// Longest rendered section. Two of them, with headings and their overflow
/// notes, stay under [`MAX_COMMENT_CHARS`].
const MAX_SECTION_CHARS: usize = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("no output ({0})")]
    NoOutput(String),
    #[error("unexpected output: {0}")]
    Malformed(String),
    #[error("{0}")]
    Reported(String),
    #[error("did not finish before the job deadline")]
    OutOfTime,
}

/// Both sections of the lint/security comment.
#[derive(Debug)]
pub struct AnalysisReport {
    pub lint: Result<LintFindings, ToolFailure>,
    pub security: Result<AuditFindings, ToolFailure>,
}

impl AnalysisReport {
    pub fn lint_section(&self) -> String {
        let section = match &self.lint {
            Ok(findings) => findings.render(),
            Err(e) => format!("⚠️ Lint failed: {e}"),
        };
        cap_section(section)
    }

    pub fn security_section(&self) -> String {
        let section = match &self.security {
            Ok(findings) => findings.render(),
            Err(e) => format!("⚠️ Security scan failed: {e}"),
        };
        cap_section(section)
    }

    pub fn render(&self) -> String {
        [
            ANALYSIS_BANNER.to_string(),
            format!("**Lint Report:**\n{}", self.lint_section()),
            format!("**Security Report:**\n{}", self.security_section()),
        ]
        .join("\n\n")
    }
}

/// Keep whole lines of `section` up to [`MAX_SECTION_CHARS`] and note how
/// many were left out.
fn cap_section(section: String) -> String {
    if section.chars().count() <= MAX_SECTION_CHARS {
        return section;
    }
    let lines = section.lines().collect::<Vec<_>>();
    let mut used = 0;
    let mut kept = 0;
    for line in &lines {
        let len = line.chars().count() + 1;
        if used + len > MAX_SECTION_CHARS {
            break;
        }
        used += len;
        kept += 1;
    }
    format!("{}\n… {} more lines not shown", lines[..kept].join("\n"), lines.len() - kept)
}

/// Run a reporting tool and return its stdout. Reporting tools exit non-zero
/// when they find something, so the exit status alone is not a failure.
async fn run_tool<R: CommandRunner>(
    runner: &R,
    command: &ToolCommand,
    dir: &Path,
) -> Result<String, ToolFailure> {
    let output = runner.run(&Invocation::new(command, dir)).await?;
    if output.stdout.trim().is_empty() {
        return Err(ToolFailure::NoOutput(output.describe()));
    }
    if !output.success() {
        tracing::debug!("{} reported {}", command.program, output.describe());
    }
    Ok(output.stdout)
}

pub async fn run_lint<R: CommandRunner>(
    runner: &R,
    command: &ToolCommand,
    checkout: &Path,
) -> Result<LintFindings, ToolFailure> {
    let stdout = run_tool(runner, command, checkout).await?;
    Ok(lint::parse(&stdout)?.relative_to(checkout))
}

pub async fn run_audit<R: CommandRunner>(
    runner: &R,
    command: &ToolCommand,
    checkout: &Path,
) -> Result<AuditFindings, ToolFailure> {
    let stdout = run_tool(runner, command, checkout).await?;
    audit::parse(&stdout)
}
