use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one pull request to review.
///
/// Validated on construction and when deserialized, so no owner or
/// repository name reaches a clone URL or an API path unchecked. Queue rows
/// carry the unvalidated form, which workers validate before running.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPullRequestRef")]
pub struct PullRequestRef {
    owner: String,
    repo: String,
    number: u64,
}

#[derive(Deserialize)]
struct RawPullRequestRef {
    owner: String,
    repo: String,
    number: u64,
}

impl TryFrom<RawPullRequestRef> for PullRequestRef {
    type Error = InvalidPullRequest;

    fn try_from(raw: RawPullRequestRef) -> Result<Self, Self::Error> {
        Self::new(raw.owner, raw.repo, raw.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPullRequest {
    #[error("owner is empty")]
    EmptyOwner,
    #[error("repository name is empty")]
    EmptyRepo,
    #[error("pull request number must be positive")]
    ZeroNumber,
    #[error("invalid path segment {0:?}")]
    BadSegment(String),
}

impl PullRequestRef {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        number: u64,
    ) -> Result<Self, InvalidPullRequest> {
        let owner = owner.into();
        let repo = repo.into();
        if owner.is_empty() {
            return Err(InvalidPullRequest::EmptyOwner);
        }
        if repo.is_empty() {
            return Err(InvalidPullRequest::EmptyRepo);
        }
        if number == 0 {
            return Err(InvalidPullRequest::ZeroNumber);
        }
        for segment in [&owner, &repo] {
            if !is_path_segment(segment) {
                return Err(InvalidPullRequest::BadSegment(segment.clone()));
            }
        }
        Ok(Self { owner, repo, number })
    }

    pub fn owner(&self) -> &str { &self.owner }

    pub fn repo(&self) -> &str { &self.repo }

    pub fn number(&self) -> u64 { self.number }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

// GitHub account and repository names: ASCII alphanumerics plus `-`, `_`, `.`.
fn is_path_segment(s: &str) -> bool {
    s != "."
        && s != ".."
        && !s.starts_with('-')
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_fields() {
        assert!(PullRequestRef::new("octo", "hello-world", 7).is_ok());
        assert_eq!(PullRequestRef::new("", "r", 1), Err(InvalidPullRequest::EmptyOwner));
        assert_eq!(PullRequestRef::new("o", "", 1), Err(InvalidPullRequest::EmptyRepo));
        assert_eq!(PullRequestRef::new("o", "r", 0), Err(InvalidPullRequest::ZeroNumber));
        let cases = ["..", "a/b", "-rf", "a b", "x;rm"];
        for case in cases {
            assert!(
                matches!(PullRequestRef::new(case, "r", 1), Err(InvalidPullRequest::BadSegment(_))),
                "{case} accepted"
            );
        }
    }

    #[test]
    fn test_deserialize_rejects_malformed_payloads() {
        let ok: PullRequestRef =
            serde_json::from_str(r#"{"owner":"octo","repo":"site.github.io","number":3}"#)
                .unwrap();
        assert_eq!(ok.to_string(), "octo/site.github.io#3");

        let payloads = [
            r#"{"owner":"octo","repo":"r","number":0}"#,
            r#"{"owner":"","repo":"r","number":1}"#,
            r#"{"owner":"octo","repo":"../etc","number":1}"#,
            r#"{"owner":"octo","number":1}"#,
            r#"{"owner":"octo","repo":"r","number":-1}"#,
        ];
        for payload in payloads {
            assert!(serde_json::from_str::<PullRequestRef>(payload).is_err(), "{payload}");
        }
    }
}
