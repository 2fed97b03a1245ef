use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::{debug_handler, Json};
use bytes::Bytes;
use common_metrics::inc;
use common_types::{AnonymousIdentity, AssignResponse, SessionRecord};
use tracing::instrument;

use crate::api::ApiError;
use crate::identity::{bearer_token, Participant};
use crate::metrics_consts::{
    ANONYMOUS_SIGNINS_COUNTER, SESSIONS_WRITTEN_COUNTER, SESSION_WRITE_ERRORS_COUNTER,
};
use crate::router;
use crate::sessions::{validate_record, SessionSinkError};

async fn authenticate(state: &router::State, headers: &HeaderMap) -> Result<Participant, ApiError> {
    let token = bearer_token(headers)?;
    Ok(state.identity.authenticate(token).await?)
}

/// `POST /assign-condition`: one balanced condition per call.
///
/// The caller must be signed in. The body is ignored.
#[debug_handler]
#[instrument(skip_all)]
pub async fn assign_condition(
    State(state): State<router::State>,
    headers: HeaderMap,
) -> Result<Json<AssignResponse>, ApiError> {
    let participant = authenticate(&state, &headers).await?;
    tracing::debug!(participant_id = %participant.id, "assigning condition");

    let condition = state.balancer.assign().await?;
    Ok(Json(AssignResponse { condition }))
}

#[debug_handler]
#[instrument(skip_all)]
pub async fn sign_in_anonymously(
    State(state): State<router::State>,
) -> Result<Json<AnonymousIdentity>, ApiError> {
    let identity = state.identity.sign_in_anonymously().await?;
    inc(ANONYMOUS_SIGNINS_COUNTER, &[], 1);

    Ok(Json(identity))
}

pub fn write_error_reason(error: &SessionSinkError) -> &'static str {
    match error {
        SessionSinkError::Invalid(_) => "invalid",
        SessionSinkError::Duplicate(_) => "duplicate",
        SessionSinkError::Unavailable(_) => "unavailable",
    }
}

/// `POST /sessions`: answers 201 only once the record is durably written.
#[debug_handler]
#[instrument(skip_all)]
pub async fn write_session(
    State(state): State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let participant = authenticate(&state, &headers).await?;

    match headers.get(CONTENT_TYPE).map(|v| v.to_str()) {
        Some(Ok(content_type)) if content_type.starts_with("application/json") => {}
        Some(Ok(content_type)) => {
            return Err(ApiError::RequestDecodingError(format!(
                "unsupported content type {content_type}"
            )))
        }
        _ => {
            return Err(ApiError::RequestDecodingError(
                "missing content type".to_string(),
            ))
        }
    }

    let record: SessionRecord = serde_json::from_slice(&body)?;

    let written = match validate_record(&record, &state.config.experiment_id) {
        Ok(()) => state.sessions.write(&participant, &record).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        inc(
            SESSION_WRITE_ERRORS_COUNTER,
            &[("reason".to_string(), write_error_reason(&e).to_string())],
            1,
        );
        return Err(e.into());
    }

    inc(
        SESSIONS_WRITTEN_COUNTER,
        &[("condition".to_string(), record.condition.to_string())],
        1,
    );
    tracing::info!(session_id = %record.session_id, condition = %record.condition, "session recorded");

    Ok(StatusCode::CREATED)
}
