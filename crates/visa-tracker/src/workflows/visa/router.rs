use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use super::domain::{Application, TrackingId, VisaArtifact};
use super::notification::{DispatchOutcome, MailTransport, NotificationDispatcher};
use super::repository::{ApplicationFeed, ApplicationRepository};
use super::service::{VisaServiceError, VisaStatusService};
use super::status::StatusValue;
use super::tracking::{TrackingProjector, TrackingState};

/// Shared handler state: the status service plus the dispatcher it hands events to.
pub struct WorkflowState<R, T> {
    pub service: Arc<VisaStatusService<R>>,
    pub dispatcher: Arc<NotificationDispatcher<T>>,
}

impl<R, T> Clone for WorkflowState<R, T> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// Admin response separating the committed write from the notification attempt.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub saved: bool,
    pub changed: bool,
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<DispatchOutcome>,
}

#[derive(Debug, Serialize)]
pub struct AdminApplicationView {
    pub application: Application,
    pub stored_status: StatusValue,
    pub drifted: bool,
}

/// Router builder exposing the admin mutation endpoints and the customer tracking view.
pub fn application_router<R, T>(
    service: Arc<VisaStatusService<R>>,
    dispatcher: Arc<NotificationDispatcher<T>>,
) -> Router
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications/:tracking_id",
            get(application_handler::<R, T>),
        )
        .route(
            "/api/v1/applications/:tracking_id/status",
            put(bulk_status_handler::<R, T>),
        )
        .route(
            "/api/v1/applications/:tracking_id/applicants/:index/status",
            put(applicant_status_handler::<R, T>),
        )
        .route(
            "/api/v1/applications/:tracking_id/applicants/:index/visa",
            post(issue_visa_handler::<R, T>),
        )
        .route(
            "/api/v1/tracking/:tracking_id",
            get(tracking_handler::<R, T>),
        )
        .route(
            "/api/v1/tracking/:tracking_id/stream",
            get(tracking_stream_handler::<R, T>),
        )
        .with_state(WorkflowState {
            service,
            dispatcher,
        })
}

pub(crate) async fn application_handler<R, T>(
    State(state): State<WorkflowState<R, T>>,
    Path(tracking_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    match state.service.get(&TrackingId(tracking_id)) {
        Ok(parsed) => {
            let view = AdminApplicationView {
                drifted: parsed.drifted(),
                stored_status: parsed.stored_status,
                application: parsed.application,
            };
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn applicant_status_handler<R, T>(
    State(state): State<WorkflowState<R, T>>,
    Path((tracking_id, index)): Path<(String, usize)>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    let Some(status) = StatusValue::parse(&request.status) else {
        return invalid_status(&request.status);
    };

    let transition =
        match state
            .service
            .set_applicant_status(&TrackingId(tracking_id), index, status)
        {
            Ok(transition) => transition,
            Err(err) => return error_response(err),
        };

    // The write is committed at this point; the dispatch outcome is reported next to it.
    let notification = transition
        .notification
        .as_ref()
        .map(|event| state.dispatcher.dispatch(event));

    let body = MutationResponse {
        saved: true,
        changed: transition.changed,
        application: transition.application,
        notification,
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) async fn bulk_status_handler<R, T>(
    State(state): State<WorkflowState<R, T>>,
    Path(tracking_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    let Some(status) = StatusValue::parse(&request.status) else {
        return invalid_status(&request.status);
    };

    match state
        .service
        .set_all_applicants_status(&TrackingId(tracking_id), status)
    {
        Ok(application) => {
            let body = MutationResponse {
                saved: true,
                changed: true,
                application,
                notification: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn issue_visa_handler<R, T>(
    State(state): State<WorkflowState<R, T>>,
    Path((tracking_id, index)): Path<(String, usize)>,
    Json(artifact): Json<VisaArtifact>,
) -> Response
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    match state
        .service
        .issue_visa(&TrackingId(tracking_id), index, artifact)
    {
        Ok(issuance) => {
            let notification = state.dispatcher.dispatch(&issuance.notification);
            let body = MutationResponse {
                saved: true,
                changed: true,
                application: issuance.application,
                notification: Some(notification),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn tracking_handler<R, T>(
    State(state): State<WorkflowState<R, T>>,
    Path(tracking_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    let id = TrackingId(tracking_id);
    let document = match state.service.repository().fetch(&id) {
        Ok(document) => document,
        Err(err) => {
            warn!(tracking_id = %id, error = %err, "tracking lookup failed");
            None
        }
    };

    match TrackingProjector::project_document(&id, document.as_ref()) {
        TrackingState::Loaded(view) => (StatusCode::OK, Json(view)).into_response(),
        _ => not_found(&id),
    }
}

pub(crate) async fn tracking_stream_handler<R, T>(
    State(state): State<WorkflowState<R, T>>,
    Path(tracking_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + ApplicationFeed + 'static,
    T: MailTransport + 'static,
{
    let id = TrackingId(tracking_id);
    let mut subscription = match TrackingProjector::subscribe(state.service.repository().as_ref(), &id) {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(tracking_id = %id, error = %err, "tracking feed unavailable");
            return not_found(&id);
        }
    };

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(16);
    tokio::spawn(async move {
        loop {
            let tracking = tokio::select! {
                tracking = subscription.next() => tracking,
                _ = tx.closed() => break,
            };
            let disconnected = matches!(tracking, TrackingState::Disconnected);
            let Ok(event) = Event::default().event("tracking").json_data(&tracking) else {
                break;
            };
            if tx.send(Ok(event)).await.is_err() || disconnected {
                break;
            }
        }
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn not_found(id: &TrackingId) -> Response {
    let payload = json!({
        "tracking_id": id.0,
        "status": "not_found",
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn invalid_status(raw: &str) -> Response {
    let payload = json!({
        "error": format!("unknown status '{raw}'"),
        "allowed": StatusValue::ALL.iter().map(|status| status.label()).collect::<Vec<_>>(),
    });
    (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
}

fn error_response(err: VisaServiceError) -> Response {
    let payload = json!({
        "saved": false,
        "error": err.to_string(),
    });
    (err.status_code(), Json(payload)).into_response()
}
