use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, warn};

use super::document::ParsedApplication;
use super::domain::{Application, ApplicationPatch, TrackingId, VisaArtifact};
use super::notification::NotificationEvent;
use super::repository::{ApplicationRepository, RepositoryError};
use super::status::StatusValue;

/// Sole writer of applicant statuses and of the cached overall status.
pub struct VisaStatusService<R> {
    repository: Arc<R>,
}

/// Result of a single-applicant status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    /// Committed state (or the unchanged state when `changed` is false).
    pub application: Application,
    pub changed: bool,
    /// Present exactly when a write happened; targets only the changed applicant.
    pub notification: Option<NotificationEvent>,
}

impl StatusTransition {
    pub fn recipient(&self) -> Option<&str> {
        self.notification
            .as_ref()
            .and_then(|event| event.applicant.recipient())
    }
}

impl<R> VisaStatusService<R>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Fetch and normalise an application. A drifted cached status is recomputed, not trusted.
    pub fn get(&self, id: &TrackingId) -> Result<ParsedApplication, VisaServiceError> {
        let parsed = self.load(id)?;
        if parsed.drifted() {
            warn!(
                tracking_id = %id,
                stored = %parsed.stored_status,
                derived = %parsed.application.status,
                "cached overall status drifted from applicants, serving recomputed value"
            );
        }
        Ok(parsed)
    }

    /// Change one applicant's status. Setting the current value again is a no-op: no write
    /// and no notification.
    pub fn set_applicant_status(
        &self,
        id: &TrackingId,
        applicant_index: usize,
        status: StatusValue,
    ) -> Result<StatusTransition, VisaServiceError> {
        let mut application = self.load(id)?.into_application();
        let len = application.applicants.len();
        let applicant = application
            .applicants
            .get_mut(applicant_index)
            .ok_or(VisaServiceError::ApplicantOutOfRange {
                index: applicant_index,
                len,
            })?;

        let previous = applicant.status;
        if previous == status {
            return Ok(StatusTransition {
                application,
                changed: false,
                notification: None,
            });
        }
        applicant.status = status;

        application.refresh_status();
        let application = self.commit(application, None)?;
        info!(
            tracking_id = %id,
            applicant = applicant_index,
            from = %previous,
            to = %status,
            overall = %application.status,
            "applicant status saved"
        );

        let notification = NotificationEvent {
            application_id: application.tracking_id.clone(),
            applicant_index,
            applicant: application.applicants[applicant_index].clone(),
            previous_status: Some(previous),
            new_status: status,
            visa_file_url: None,
            plan: application.plan.clone(),
        };

        Ok(StatusTransition {
            application,
            changed: true,
            notification: Some(notification),
        })
    }

    /// Set every applicant to `status` in one write.
    ///
    /// Bulk edits are a correction tool and never produce notifications.
    pub fn set_all_applicants_status(
        &self,
        id: &TrackingId,
        status: StatusValue,
    ) -> Result<Application, VisaServiceError> {
        let mut application = self.load(id)?.into_application();
        for applicant in &mut application.applicants {
            applicant.status = status;
        }

        application.refresh_status();
        let application = self.commit(application, None)?;
        info!(
            tracking_id = %id,
            applicants = application.applicants.len(),
            status = %status,
            overall = %application.status,
            "bulk applicant status saved"
        );
        Ok(application)
    }

    pub(super) fn load(&self, id: &TrackingId) -> Result<ParsedApplication, VisaServiceError> {
        let document = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(ParsedApplication::from_document(id, &document))
    }

    /// Persist applicants, overall status and `updatedAt` (plus the legacy visa file when
    /// given) as one write. Nothing is returned unless the store confirmed it.
    pub(super) fn commit(
        &self,
        mut application: Application,
        visa_file: Option<VisaArtifact>,
    ) -> Result<Application, VisaServiceError> {
        let now = Utc::now();
        let mut patch = ApplicationPatch::from_application(&application, now);
        patch.visa_file = visa_file.clone();

        self.repository.write(&application.tracking_id, &patch)?;

        application.updated_at = Some(now);
        if visa_file.is_some() {
            application.visa_file = visa_file;
        }
        Ok(application)
    }
}

/// Error raised by the status service. All variants are primary failures: nothing was
/// committed and no notification was produced.
#[derive(Debug, thiserror::Error)]
pub enum VisaServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("applicant {index} does not exist (application has {len})")]
    ApplicantOutOfRange { index: usize, len: usize },
    #[error("invalid visa artifact: {0}")]
    InvalidArtifact(&'static str),
}

impl VisaServiceError {
    /// HTTP status shared by the workflow routes and [`crate::error::AppError`].
    pub fn status_code(&self) -> StatusCode {
        match self {
            VisaServiceError::Repository(RepositoryError::NotFound)
            | VisaServiceError::ApplicantOutOfRange { .. } => StatusCode::NOT_FOUND,
            VisaServiceError::InvalidArtifact(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VisaServiceError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            VisaServiceError::Repository(RepositoryError::Encoding(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
