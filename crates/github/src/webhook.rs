use std::{fmt::Display, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hmac::{Hmac, Mac};
use octocrab::models::webhook_events::{
    WebhookEvent, WebhookEventPayload, payload::PullRequestWebhookEventAction,
};
use pullcheck_core::{
    config::Config,
    models::{InvalidPullRequest, PullRequestRef},
};
use sha2::Sha256;

/// Verify and extract GitHub Event Payload.
#[derive(Clone)]
#[must_use]
pub struct GitHubEvent {
    pub event: WebhookEvent,
}

impl<S> FromRequest<S> for GitHubEvent
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync + Clone,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        fn err(m: impl Display) -> Response {
            tracing::error!("{m}");
            (StatusCode::BAD_REQUEST, m.to_string()).into_response()
        }
        let event = req
            .headers()
            .get("X-GitHub-Event")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| err("X-GitHub-Event header missing"))?
            .to_string();
        let config = <Arc<Config>>::from_ref(state);
        let body = if let Some(secret) = &config.github.webhook_secret {
            let signature_sha256 = req
                .headers()
                .get("X-Hub-Signature-256")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| err("X-Hub-Signature-256 missing"))?
                .strip_prefix("sha256=")
                .ok_or_else(|| err("X-Hub-Signature-256 sha256= prefix missing"))?;
            let signature =
                hex::decode(signature_sha256).map_err(|_| err("X-Hub-Signature-256 malformed"))?;
            let body =
                Bytes::from_request(req, state).await.map_err(|_| err("error reading body"))?;
            if !verify_signature(secret.as_bytes(), &body, &signature) {
                return Err(err("signature mismatch"));
            }
            body
        } else {
            Bytes::from_request(req, state).await.map_err(|_| err("error reading body"))?
        };
        let value = WebhookEvent::try_from_header_and_body(&event, &body)
            .map_err(|_| err("error parsing body"))?;
        Ok(GitHubEvent { event: value })
    }
}

fn verify_signature(secret: &[u8], body: &[u8], signature: &[u8]) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(signature).is_ok()
}

/// Whether a pull request action should trigger a review.
pub fn is_review_action(action: &PullRequestWebhookEventAction) -> bool {
    matches!(
        action,
        PullRequestWebhookEventAction::Opened | PullRequestWebhookEventAction::Synchronize
    )
}

/// Extract the pull request to review from an `opened` or `synchronize`
/// event. Returns `None` for every other event.
///
/// The owner and name come from the pull request's base repository, which
/// is where comments must land even when the head lives in a fork.
pub fn review_target(event: &WebhookEvent) -> Option<Result<PullRequestRef, InvalidPullRequest>> {
    let WebhookEventPayload::PullRequest(inner) = &event.specific else {
        return None;
    };
    if !is_review_action(&inner.action) {
        return None;
    }
    let repository = inner.pull_request.base.repo.as_ref().or(event.repository.as_ref());
    let owner = repository.and_then(|r| r.owner.as_ref()).map(|o| o.login.clone());
    let repo = repository.map(|r| r.name.clone());
    Some(PullRequestRef::new(owner.unwrap_or_default(), repo.unwrap_or_default(), inner.number))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn account(login: &str) -> Value {
        let api = "https://api.github.com/users/octo";
        json!({
            "login": login,
            "id": 583231,
            "node_id": "MDQ6VXNlcjU4MzIzMQ==",
            "avatar_url": "https://avatars.githubusercontent.com/u/583231?v=4",
            "gravatar_id": "",
            "url": api,
            "html_url": "https://github.com/octo",
            "followers_url": format!("{api}/followers"),
            "following_url": format!("{api}/following"),
            "gists_url": format!("{api}/gists"),
            "starred_url": format!("{api}/starred"),
            "subscriptions_url": format!("{api}/subscriptions"),
            "organizations_url": format!("{api}/orgs"),
            "repos_url": format!("{api}/repos"),
            "events_url": format!("{api}/events"),
            "received_events_url": format!("{api}/received_events"),
            "type": "User",
            "site_admin": false
        })
    }

    fn repository(owner: &str, name: &str) -> Value {
        json!({
            "id": 1296269,
            "node_id": "MDEwOlJlcG9zaXRvcnkxMjk2MjY5",
            "name": name,
            "full_name": format!("{owner}/{name}"),
            "owner": account(owner),
            "private": false,
            "url": "https://api.github.com/repos/octo/widgets"
        })
    }

    fn pull_request_event(action: &str, base_repo: Option<Value>, event_repo: Value) -> WebhookEvent {
        let mut base = json!({
            "label": "octo:main",
            "ref": "main",
            "sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e"
        });
        if let Some(repo) = base_repo {
            base["repo"] = repo;
        }
        let body = json!({
            "action": action,
            "number": 42,
            "pull_request": {
                "url": "https://api.github.com/repos/octo/widgets/pulls/42",
                "id": 1824339142,
                "number": 42,
                "state": "open",
                "title": "Add widget",
                "head": {
                    "label": "contributor:feature",
                    "ref": "feature",
                    "sha": "e5bd3914e2e596debea16f433f57875b5b90bcd6"
                },
                "base": base
            },
            "repository": event_repo
        });
        WebhookEvent::try_from_header_and_body("pull_request", &serde_json::to_vec(&body).unwrap())
            .unwrap()
    }

    fn widgets() -> PullRequestRef { PullRequestRef::new("octo", "widgets", 42).unwrap() }

    #[test]
    fn test_review_target_for_review_actions() {
        for action in ["opened", "synchronize"] {
            let event = pull_request_event(
                action,
                Some(repository("octo", "widgets")),
                repository("octo", "widgets"),
            );
            assert_eq!(review_target(&event), Some(Ok(widgets())), "{action}");
        }
    }

    #[test]
    fn test_review_target_ignores_other_actions() {
        for action in ["closed", "labeled", "edited"] {
            let event = pull_request_event(
                action,
                Some(repository("octo", "widgets")),
                repository("octo", "widgets"),
            );
            assert_eq!(review_target(&event), None, "{action}");
        }
    }

    #[test]
    fn test_review_target_repository() {
        // The base repository wins over the event's repository.
        let event = pull_request_event(
            "opened",
            Some(repository("octo", "widgets")),
            repository("contributor", "widgets-fork"),
        );
        assert_eq!(review_target(&event), Some(Ok(widgets())));

        let event = pull_request_event("opened", None, repository("octo", "widgets"));
        assert_eq!(review_target(&event), Some(Ok(widgets())));
    }

    #[test]
    fn test_review_target_invalid_owner() {
        let event = pull_request_event(
            "opened",
            Some(repository("-octo", "widgets")),
            repository("-octo", "widgets"),
        );
        assert_eq!(
            review_target(&event),
            Some(Err(InvalidPullRequest::BadSegment("-octo".to_string())))
        );
    }

    #[test]
    fn test_verify_signature() {
        // HMAC-SHA256("It's a Secret to Everybody", "Hello, World!") from GitHub's docs
        let signature =
            hex::decode("757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17")
                .unwrap();
        assert!(verify_signature(b"It's a Secret to Everybody", b"Hello, World!", &signature));
        assert!(!verify_signature(b"wrong secret", b"Hello, World!", &signature));
        assert!(!verify_signature(b"It's a Secret to Everybody", b"Hello, World?", &signature));
    }

    #[test]
    fn test_review_actions() {
        assert!(is_review_action(&PullRequestWebhookEventAction::Opened));
        assert!(is_review_action(&PullRequestWebhookEventAction::Synchronize));
        assert!(!is_review_action(&PullRequestWebhookEventAction::Closed));
        assert!(!is_review_action(&PullRequestWebhookEventAction::Labeled));
    }
}
