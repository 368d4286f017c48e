use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tgs_core::{
    errors::{ConnectionError, ErrorKind, FetchError},
    fetcher::StoryTarget,
    ports::StoryService,
    response::{self, Assembled, InlineBody, OutputMode},
};

use crate::AppState;

/// Status code for a failure kind. `cancelled` uses the non-standard 499.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::Resolution | ErrorKind::UnsupportedPeerKind => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotFound | ErrorKind::NoMedia => StatusCode::NOT_FOUND,
        ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Connection => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::AllMethodsFailed | ErrorKind::UploadFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectQuery {
    url: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StoryQuery {
    username: Option<String>,
    storyid: Option<String>,
}

impl StoryQuery {
    fn target(self) -> Result<StoryTarget, FetchError> {
        let peer = self
            .username
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| FetchError::InvalidInput("username parameter is required".into()))?;
        let raw = self
            .storyid
            .ok_or_else(|| FetchError::InvalidInput("storyid parameter is required".into()))?;
        let story_id = raw.trim().parse::<i64>().map_err(|_| {
            FetchError::InvalidInput(format!("storyid must be an integer, got {raw:?}"))
        })?;
        Ok(StoryTarget::Explicit { peer, story_id })
    }
}

fn parse_mode(raw: Option<&str>) -> Result<OutputMode, FetchError> {
    match raw {
        None => Ok(OutputMode::default()),
        Some(m) => serde_json::from_value(serde_json::Value::String(m.to_lowercase()))
            .map_err(|_| FetchError::InvalidInput(format!("unknown mode {m:?}"))),
    }
}

pub(crate) async fn direct(State(state): State<AppState>, Query(q): Query<DirectQuery>) -> Response {
    let mode = match parse_mode(q.mode.as_deref()) {
        Ok(m) => m,
        Err(e) => return failure(&state, &e),
    };
    let Some(url) = q.url.filter(|u| !u.trim().is_empty()) else {
        return failure(&state, &FetchError::InvalidInput("url parameter is required".into()));
    };
    deliver(&state, StoryTarget::Url(url), mode).await
}

pub(crate) async fn download(State(state): State<AppState>, Query(q): Query<StoryQuery>) -> Response {
    match q.target() {
        Ok(target) => deliver(&state, target, OutputMode::Inline).await,
        Err(e) => failure(&state, &e),
    }
}

pub(crate) async fn base64(State(state): State<AppState>, Query(q): Query<StoryQuery>) -> Response {
    match q.target() {
        Ok(target) => deliver(&state, target, OutputMode::Base64).await,
        Err(e) => failure(&state, &e),
    }
}

pub(crate) async fn check(State(state): State<AppState>, Query(q): Query<StoryQuery>) -> Response {
    let target = match q.target() {
        Ok(t) => t,
        Err(e) => return failure(&state, &e),
    };
    let cancel = state.shutdown.child_token();
    match state.fetcher.check(&target, &cancel).await {
        Ok((peer, item)) => Json(state.assembler.check(&peer, &item)).into_response(),
        Err(e) => (status_for(e.kind()), Json(state.assembler.check_failure(&e))).into_response(),
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Response {
    let deadline = state.fetcher.request_deadline();
    let lookup = async {
        let conn = state.fetcher.session().ensure_connected().await?;
        conn.account_name().await.map_err(ConnectionError::from)
    };
    let outcome = tokio::select! {
        _ = state.shutdown.cancelled() => Err(ConnectionError::new("server is shutting down")),
        res = tokio::time::timeout(deadline, lookup) => res.unwrap_or_else(|_| {
            Err(ConnectionError::new(format!(
                "health check timed out after {}s",
                deadline.as_secs()
            )))
        }),
    };
    match outcome {
        Ok(account) => Json(serde_json::json!({
            "status": "ok",
            "connected": true,
            "account": account,
            "timestamp": response::now(),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unavailable",
                    "connected": false,
                    "error": e.to_string(),
                    "timestamp": response::now(),
                })),
            )
                .into_response()
        }
    }
}

async fn deliver(state: &AppState, target: StoryTarget, mode: OutputMode) -> Response {
    let cancel = state.shutdown.child_token();
    let fetched = match state.fetcher.fetch(&target, &cancel).await {
        Ok(f) => f,
        Err(e) => return failure(state, &e),
    };

    let mut file_url = None;
    if let (OutputMode::Link, Some(host)) = (mode, &state.file_host) {
        match host
            .upload(&fetched.filename(), &fetched.media.mime_type, fetched.media.bytes.clone())
            .await
        {
            Ok(url) => file_url = Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "file host upload failed");
                return failure(state, &FetchError::Upload(e));
            }
        }
    }

    match state.assembler.assemble(fetched, mode, file_url) {
        Assembled::Inline(body) => inline(body),
        Assembled::Json(envelope) => Json(envelope).into_response(),
    }
}

fn inline(body: InlineBody) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", body.filename);
    (
        [
            (header::CONTENT_TYPE, body.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body.bytes,
    )
        .into_response()
}

fn failure(state: &AppState, err: &FetchError) -> Response {
    (status_for(err.kind()), Json(state.assembler.failure(err))).into_response()
}
