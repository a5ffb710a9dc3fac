//! In-memory collaborators for pipeline tests.

use std::{fs, io, sync::Mutex, time::Duration};

use pullcheck_core::{
    clients::{ReviewError, Reviewer, ScmError, SourceControl},
    models::PullRequestRef,
};

use crate::process::{CommandOutput, CommandRunner, Invocation, ProcessError};

pub fn pull() -> PullRequestRef { PullRequestRef::new("octo", "widgets", 42).unwrap() }

pub struct FakeScm {
    diff: Option<String>,
    reject_comments: bool,
    comments: Mutex<Vec<(PullRequestRef, String)>>,
}

impl Default for FakeScm {
    fn default() -> Self { Self::with_diff("") }
}

impl FakeScm {
    pub fn with_diff(diff: &str) -> Self {
        Self { diff: Some(diff.to_string()), reject_comments: false, comments: Mutex::default() }
    }

    pub fn without_diff() -> Self { Self { diff: None, ..Self::default() } }

    pub fn rejecting_comments(self) -> Self { Self { reject_comments: true, ..self } }

    pub fn comments(&self) -> Vec<(PullRequestRef, String)> { self.comments.lock().unwrap().clone() }
}

impl SourceControl for FakeScm {
    async fn fetch_diff(&self, pull: &PullRequestRef) -> Result<String, ScmError> {
        self.diff.clone().ok_or_else(|| ScmError::DiffUnavailable {
            pull: pull.clone(),
            reason: "404 Not Found".to_string(),
        })
    }

    async fn post_comment(&self, pull: &PullRequestRef, body: &str) -> Result<(), ScmError> {
        if self.reject_comments {
            return Err(ScmError::CommentRejected {
                pull: pull.clone(),
                reason: "403 Forbidden".to_string(),
            });
        }
        self.comments.lock().unwrap().push((pull.clone(), body.to_string()));
        Ok(())
    }
}

pub struct FakeReviewer {
    response: Result<String, Option<String>>,
    diffs: Mutex<Vec<String>>,
}

impl FakeReviewer {
    pub fn responding(review: &str) -> Self {
        Self { response: Ok(review.to_string()), diffs: Mutex::default() }
    }

    pub fn empty() -> Self { Self { response: Err(None), diffs: Mutex::default() } }

    pub fn failing(reason: &str) -> Self {
        Self { response: Err(Some(reason.to_string())), diffs: Mutex::default() }
    }

    pub fn diffs(&self) -> Vec<String> { self.diffs.lock().unwrap().clone() }
}

impl Reviewer for FakeReviewer {
    async fn review(&self, diff: &str) -> Result<String, ReviewError> {
        self.diffs.lock().unwrap().push(diff.to_string());
        match &self.response {
            Ok(review) => Ok(review.clone()),
            Err(None) => Err(ReviewError::EmptyResponse),
            Err(Some(reason)) => Err(ReviewError::Provider(reason.clone())),
        }
    }
}

/// Scripted outcome of one external command. `{checkout}` in stdout is
/// replaced with the command's working directory.
#[derive(Debug, Clone)]
pub enum Step {
    Output(CommandOutput),
    Crash,
    Hang,
}

impl Step {
    pub fn exit(code: i32, stdout: &str) -> Self {
        Self::Output(CommandOutput {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn with_stderr(self, stderr: &str) -> Self {
        match self {
            Self::Output(output) => Self::Output(CommandOutput { stderr: stderr.to_string(), ..output }),
            other => other,
        }
    }

    pub fn eslint_in_checkout(file: &str, rule: &str, severity: u8, message: &str, line: u32) -> Self {
        Self::exit(
            1,
            &format!(
                r#"[{{"filePath":"{{checkout}}/{file}","messages":[{{"ruleId":"{rule}","severity":{severity},"message":"{message}","line":{line}}}]}}]"#
            ),
        )
    }
}

/// Command runner that answers git/npm/npx invocations from a script.
pub struct ScriptedRunner {
    pub clone: Step,
    pub install: Step,
    pub lint: Step,
    pub audit: Step,
    /// Whether a successful clone produces a `package.json`.
    pub manifest: bool,
    pub calls: Mutex<Vec<Invocation>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self {
            clone: Step::exit(0, ""),
            install: Step::exit(0, "added 12 packages"),
            lint: Step::exit(0, "[]"),
            audit: Step::exit(0, r#"{"auditReportVersion":2,"vulnerabilities":{}}"#),
            manifest: true,
            calls: Mutex::default(),
        }
    }
}

impl ScriptedRunner {
    pub fn invocations(&self) -> Vec<Invocation> { self.calls.lock().unwrap().clone() }

    fn step_for(&self, invocation: &Invocation) -> &Step {
        match (invocation.program.as_str(), invocation.args.first().map(String::as_str)) {
            ("git", _) => &self.clone,
            (_, Some("install")) => &self.install,
            (_, Some("audit")) => &self.audit,
            _ => &self.lint,
        }
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let step = self.step_for(invocation).clone();
        match step {
            Step::Crash => Err(ProcessError::Spawn {
                program: invocation.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            }),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hung command was expected to be cancelled")
            }
            Step::Output(mut output) => {
                if invocation.program == "git" && output.success() {
                    let checkout = invocation.args.last().expect("clone target");
                    fs::create_dir_all(checkout).expect("create checkout");
                    fs::write(format!("{checkout}/index.js"), "var x = 1;\n").expect("write source");
                    if self.manifest {
                        fs::write(format!("{checkout}/package.json"), "{}").expect("write manifest");
                    }
                }
                let dir = invocation.working_dir.to_string_lossy();
                output.stdout = output.stdout.replace("{checkout}", &dir);
                Ok(output)
            }
        }
    }
}
