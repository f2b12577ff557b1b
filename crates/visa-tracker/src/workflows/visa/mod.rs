//! Multi-applicant visa status aggregation, issuance and notification.
//!
//! Administrators change applicant statuses or attach issued documents through
//! [`VisaStatusService`]; every write recomputes the cached overall status. The service
//! hands back a [`NotificationEvent`] for the one applicant that changed, which the
//! [`NotificationDispatcher`] turns into an e-mail. Customers follow progress through the
//! read-only [`TrackingProjector`].

pub mod document;
pub mod domain;
mod issuance;
pub mod notification;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use document::{ApplicantShape, ParsedApplication, StatusSource};
pub use domain::{
    Applicant, Application, ApplicationPatch, PlanSummary, TrackingId, VisaArtifact,
};
pub use issuance::Issuance;
pub use notification::{
    ContactEntry, DispatchOutcome, EmailMessage, MailTransport, MessageTemplate,
    NotificationDispatcher, NotificationError, NotificationEvent, NotificationRequest,
    NotificationWarning, SkipReason,
};
pub use repository::{ApplicationFeed, ApplicationRepository, RepositoryError};
pub use router::application_router;
pub use service::{StatusTransition, VisaServiceError, VisaStatusService};
pub use status::{aggregate, customer_bucket, CustomerBucket, StatusValue};
pub use tracking::{
    TrackingApplicantRow, TrackingProjector, TrackingState, TrackingSubscription, TrackingView,
};
