//! `npm audit --json` output, in both the npm 7+ and npm 6 layouts.

use serde_json::{Map, Value};

use super::ToolFailure;

pub const NO_VULNERABILITIES: &str = "✅ No vulnerabilities found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub package: String,
    pub severity: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFindings {
    pub vulnerabilities: Vec<Vulnerability>,
}

pub fn parse(stdout: &str) -> Result<AuditFindings, ToolFailure> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| ToolFailure::Malformed(format!("invalid audit JSON: {e}")))?;
    let Value::Object(root) = value else {
        return Err(ToolFailure::Malformed("expected an audit report object".to_string()));
    };
    if let Some(error) = root.get("error") {
        let summary = error
            .get("summary")
            .or_else(|| error.get("code"))
            .and_then(Value::as_str)
            .unwrap_or("npm audit reported an error");
        return Err(ToolFailure::Reported(summary.to_string()));
    }
    let mut vulnerabilities: Vec<Vulnerability> = match (root.get("vulnerabilities"), root.get("advisories")) {
        (Some(Value::Object(entries)), _) => entries.iter().map(from_npm7).collect(),
        (_, Some(Value::Object(entries))) => entries.values().map(from_npm6).collect(),
        _ => Vec::new(),
    };
    vulnerabilities.sort_by(|a, b| a.package.cmp(&b.package));
    Ok(AuditFindings { vulnerabilities })
}

fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

// npm 7+: advisory details live in `via`. Entries that are only vulnerable
// through another package list that package's name there instead.
fn from_npm7((package, entry): (&String, &Value)) -> Vulnerability {
    let empty = Map::new();
    let entry = entry.as_object().unwrap_or(&empty);
    let via = entry.get("via").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    let advisory = via.iter().filter_map(Value::as_object).find(|v| v.contains_key("title"));
    let title = str_field(entry, "title")
        .or_else(|| advisory.and_then(|a| str_field(a, "title")))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let names = via.iter().filter_map(Value::as_str).collect::<Vec<_>>();
            if names.is_empty() {
                "unknown advisory".to_string()
            } else {
                format!("via {}", names.join(", "))
            }
        });
    let url = str_field(entry, "url")
        .or_else(|| advisory.and_then(|a| str_field(a, "url")))
        .unwrap_or("n/a")
        .to_string();
    Vulnerability {
        package: package.clone(),
        severity: str_field(entry, "severity").unwrap_or("unknown").to_string(),
        title,
        url,
    }
}

fn from_npm6(entry: &Value) -> Vulnerability {
    let empty = Map::new();
    let entry = entry.as_object().unwrap_or(&empty);
    let field = |key| str_field(entry, key).unwrap_or("unknown").to_string();
    Vulnerability {
        package: field("module_name"),
        severity: field("severity"),
        title: field("title"),
        url: str_field(entry, "url").unwrap_or("n/a").to_string(),
    }
}

impl AuditFindings {
    pub fn is_clean(&self) -> bool { self.vulnerabilities.is_empty() }

    pub fn render(&self) -> String {
        if self.is_clean() {
            return NO_VULNERABILITIES.to_string();
        }
        self.vulnerabilities
            .iter()
            .map(|v| {
                format!(
                    "Package: {}\n  Severity: {}\n  Title: {}\n  URL: {}",
                    v.package, v.severity, v.title, v.url
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
