use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use pullcheck_core::config::ToolCommand;
use tokio::process::Command;

/// A program to run, with its arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    pub fn new(command: &ToolCommand, working_dir: &Path) -> Self {
        Self {
            program: command.program.clone(),
            args: command.args.clone(),
            working_dir: working_dir.to_path_buf(),
        }
    }
}

/// Output from a completed child process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool { self.exit_code == Some(0) }

    /// Exit status and the last line of stderr, for error messages.
    pub fn describe(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "killed by signal".to_string(),
        };
        match self.stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
            Some(line) => format!("{status}: {line}"),
            None => status,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Runs external programs on behalf of a job.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send;
}

/// Grace period between SIGTERM and SIGKILL for a timed-out process group.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// Runs programs as child processes, killing any that outlive `timeout`.
///
/// Each child leads its own process group, and the whole group is killed
/// when the run ends or its future is dropped. Helpers spawned by npm, npx
/// or git therefore never outlive the job or keep writing into a removed
/// workspace. npm lifecycle scripts are disabled for every command through
/// `npm_config_ignore_scripts`, whatever the configured arguments say.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self { Self { timeout } }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        let program = invocation.program.clone();
        tracing::debug!(
            "Running {} {} in {}",
            program,
            invocation.args.join(" "),
            invocation.working_dir.display()
        );
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("npm_config_ignore_scripts", "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let child = command
            .spawn()
            .map_err(|source| ProcessError::Spawn { program: program.clone(), source })?;
        let group = ProcessGroup::new(child.id());
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ProcessError::Wait { program, source })?,
            Err(_) => {
                group.terminate().await;
                return Err(ProcessError::Timeout { program, timeout: self.timeout });
            }
        };
        let output = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.stderr.is_empty() {
            tracing::debug!("[{}] {}", invocation.program, output.stderr.trim_end());
        }
        Ok(output)
    }
}

/// The process group led by a spawned child. Dropping it SIGKILLs whatever
/// is left in the group.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self { Self { pgid: pid.and_then(|pid| i32::try_from(pid).ok()) } }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) {
        if let Some(pgid) = self.pgid {
            // SAFETY: killpg has no memory effects; pgid names the group our child leads.
            unsafe { libc::killpg(pgid, signal) };
        }
    }

    /// Ask the group to exit, then give it a moment before the drop kills it.
    async fn terminate(&self) {
        #[cfg(unix)]
        self.signal(libc::SIGTERM);
        tokio::time::sleep(TERMINATE_GRACE).await;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.signal(libc::SIGKILL);
    }
}
