//! HTTP request handlers for the trigger server.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use super::AppState;
use crate::engine::{drain, MessageQueue};
use crate::tasks::TaskFamily;

const SECRET_HEADER: &str = "x-secret-key";

/// Reject requests without the pre-shared secret.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented == state.settings.secret_key {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "error": "Unauthorized request."})),
        )
            .into_response())
    }
}

fn parse_family(s: &str) -> Result<TaskFamily, Response> {
    s.parse().map_err(|e: String| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": e})),
        )
            .into_response()
    })
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!("request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "error": e.to_string()})),
    )
        .into_response()
}

/// Fan the family's work domain out into its queue. For the refresh
/// family a progress record is created first and its id stamped into
/// every payload.
pub async fn enqueue_tasks(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
) -> Response {
    let family = match parse_family(&family) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let producer = state.producer_for(family);
    let page_size = state.settings.queue.page_size;

    let progress_id = if family.tracks_progress() {
        let total = match state.work_repo.count_active_trackers().await {
            Ok(n) => n as i32,
            Err(e) => return internal_error(e),
        };
        match state.progress_repo.create(total).await {
            Ok(record) => Some(record.id),
            Err(e) => return internal_error(e),
        }
    } else {
        None
    };

    let extra = progress_id.map(|id| {
        let mut map = serde_json::Map::new();
        map.insert("progress_id".into(), json!(id));
        map
    });

    let enqueued = match producer
        .enumerate_and_enqueue_with(page_size, extra.as_ref())
        .await
    {
        Ok(enqueued) => enqueued,
        Err(e) => return internal_error(e),
    };

    // The run's total is what actually landed in the queue, not the
    // candidate count; a skipped page must not strand the run.
    if let Some(id) = progress_id {
        if let Err(e) = state.progress_repo.set_total(id, enqueued as i32).await {
            return internal_error(e);
        }
    }

    Json(json!({
        "success": true,
        "enqueued": enqueued,
        "progress_id": progress_id,
    }))
    .into_response()
}

/// Run the drain loop for a family until its queue is empty.
pub async fn drain_tasks(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
) -> Response {
    let family = match parse_family(&family) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let dispatcher = match state.dispatcher_for(family) {
        Ok(d) => d,
        Err(e) => return internal_error(e),
    };

    match drain(&dispatcher).await {
        Ok(report) => Json(json!({
            "success": true,
            "processed": report.processed,
            "failed": report.failed,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Queue depth for a family, without leasing anything.
pub async fn family_status(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
) -> Response {
    let family = match parse_family(&family) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let pending = match state.queue_repo.pending_count(family.queue_name()).await {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };
    let dead = match state
        .queue_repo
        .dead_letter_count(family.queue_name())
        .await
    {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };

    Json(json!({
        "success": true,
        "family": family.queue_name(),
        "pending": pending,
        "dead_letters": dead,
    }))
    .into_response()
}

/// Poll a refresh run's progress.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    match state.progress_repo.get(id).await {
        Ok(Some(record)) => Json(json!({
            "success": true,
            "id": record.id,
            "total_count": record.total_count,
            "current_count": record.current_count,
            "active": record.active,
            "done": record.is_complete(),
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "progress record not found"})),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Liveness check. Unauthenticated.
pub async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    use super::super::{create_router, AppState};
    use crate::config::Settings;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let mut settings = Settings::default();
        settings.database_url = dir
            .path()
            .join("server.db")
            .to_string_lossy()
            .into_owned();
        settings.secret_key = "hunter2".into();
        AppState::new(settings)
    }

    #[tokio::test]
    async fn missing_secret_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tasks/serp/drain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Unauthorized request.");
    }

    #[tokio::test]
    async fn unknown_family_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tasks/mystery/enqueue")
                    .header("x-secret-key", "hunter2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_needs_no_secret() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
