//! ESLint JSON formatter output.

use std::path::Path;

use serde::Deserialize;

use super::ToolFailure;

pub const NO_LINT_ISSUES: &str = "✅ No lint issues found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "u8")]
pub enum Severity {
    Error,
    #[default]
    Warning,
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        match value {
            2 => Self::Error,
            _ => Self::Warning,
        }
    }
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARN",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LintMessage {
    #[serde(rename = "ruleId", default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LintFile {
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(default)]
    pub messages: Vec<LintMessage>,
}

/// Files with at least one lint message.
#[derive(Debug, Clone, Default)]
pub struct LintFindings {
    pub files: Vec<LintFile>,
}

/// Parse the output of `eslint -f json`. ESLint lists every file it
/// checked; files without messages are dropped.
pub fn parse(stdout: &str) -> Result<LintFindings, ToolFailure> {
    let mut files: Vec<LintFile> = serde_json::from_str(stdout.trim())
        .map_err(|e| ToolFailure::Malformed(format!("expected an array of file results: {e}")))?;
    files.retain(|f| !f.messages.is_empty());
    Ok(LintFindings { files })
}

impl LintFindings {
    pub fn is_clean(&self) -> bool { self.files.is_empty() }

    pub fn message_count(&self) -> usize { self.files.iter().map(|f| f.messages.len()).sum() }

    /// Show paths relative to the checkout instead of the absolute
    /// workspace paths ESLint reports.
    pub fn relative_to(mut self, base: &Path) -> Self {
        for file in &mut self.files {
            if let Ok(relative) = Path::new(&file.file_path).strip_prefix(base) {
                file.file_path = relative.to_string_lossy().into_owned();
            }
        }
        self
    }

    pub fn render(&self) -> String {
        if self.is_clean() {
            return NO_LINT_ISSUES.to_string();
        }
        self.files
            .iter()
            .map(|file| {
                let mut out = format!("File: {}", file.file_path);
                for m in &file.messages {
                    let line = m.line.map_or_else(|| "?".to_string(), |l| l.to_string());
                    out.push_str(&format!(
                        "\n  [{}] {} - {} (line {})",
                        m.severity.label(),
                        m.rule_id.as_deref().unwrap_or("unknown rule"),
                        m.message,
                        line
                    ));
                }
                out
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
