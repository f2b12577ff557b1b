use chrono::Utc;
use tracing::info;

use super::domain::{Application, TrackingId, VisaArtifact};
use super::notification::NotificationEvent;
use super::repository::ApplicationRepository;
use super::service::{VisaServiceError, VisaStatusService};
use super::status::StatusValue;

/// Result of attaching a visa document to one applicant.
#[derive(Debug, Clone, PartialEq)]
pub struct Issuance {
    pub application: Application,
    pub previous_status: StatusValue,
    /// Always present: the target applicant is told about their document even while the
    /// rest of the application is still outstanding.
    pub notification: NotificationEvent,
}

impl<R> VisaStatusService<R>
where
    R: ApplicationRepository + 'static,
{
    /// Attach an already stored visa document to one applicant and mark them issued,
    /// whatever their previous status.
    ///
    /// The artifact reference and the status change are one write. The application-level
    /// `visaFile` kept for older readers is only set once the aggregate reaches `issued`.
    pub fn issue_visa(
        &self,
        id: &TrackingId,
        applicant_index: usize,
        mut artifact: VisaArtifact,
    ) -> Result<Issuance, VisaServiceError> {
        validate_artifact(&artifact)?;
        artifact.uploaded_at.get_or_insert_with(Utc::now);

        let mut application = self.load(id)?.into_application();
        let len = application.applicants.len();
        let applicant = application
            .applicants
            .get_mut(applicant_index)
            .ok_or(VisaServiceError::ApplicantOutOfRange {
                index: applicant_index,
                len,
            })?;

        let previous_status = applicant.status;
        applicant.attach_visa(artifact.clone());
        applicant.status = StatusValue::Issued;

        let overall = application.refresh_status();
        let legacy_visa_file = (overall == StatusValue::Issued).then(|| artifact.clone());
        let application = self.commit(application, legacy_visa_file)?;

        info!(
            tracking_id = %id,
            applicant = applicant_index,
            from = %previous_status,
            overall = %application.status,
            document = %artifact.name,
            "visa issued to applicant"
        );

        let notification = NotificationEvent {
            application_id: application.tracking_id.clone(),
            applicant_index,
            applicant: application.applicants[applicant_index].clone(),
            previous_status: Some(previous_status),
            new_status: StatusValue::Issued,
            visa_file_url: Some(artifact.url),
            plan: application.plan.clone(),
        };

        Ok(Issuance {
            application,
            previous_status,
            notification,
        })
    }
}

fn validate_artifact(artifact: &VisaArtifact) -> Result<(), VisaServiceError> {
    if artifact.url.trim().is_empty() {
        return Err(VisaServiceError::InvalidArtifact("document url is empty"));
    }
    if artifact.name.trim().is_empty() {
        return Err(VisaServiceError::InvalidArtifact("document name is empty"));
    }
    Ok(())
}
