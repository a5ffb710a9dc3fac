use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pullcheck_core::AppError;
use pullcheck_github::webhook::{GitHubEvent, review_target};

use crate::AppState;

/// Webhook handler that enqueues both reviews of an opened or updated pull
/// request. Everything else is acknowledged and ignored.
pub async fn webhook(
    State(state): State<AppState>,
    GitHubEvent { event }: GitHubEvent,
) -> Result<Response, AppError> {
    match event.repository.as_ref().and_then(|r| r.full_name.as_deref()) {
        Some(full_name) => {
            tracing::info!("Received webhook event {:?} from repository {}", event.kind, full_name)
        }
        None => tracing::info!("Received webhook event {:?}", event.kind),
    }

    let pull = match review_target(&event) {
        None => return Ok((StatusCode::OK, "Event ignored").into_response()),
        Some(Err(e)) => {
            tracing::error!("Received pull_request event with invalid descriptor: {e}");
            return Ok((StatusCode::OK, "Invalid pull request").into_response());
        }
        Some(Ok(pull)) => pull,
    };

    state.dispatcher.dispatch(&pull).await?;
    Ok((StatusCode::ACCEPTED, "Review queued").into_response())
}
