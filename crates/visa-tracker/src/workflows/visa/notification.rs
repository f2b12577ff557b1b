use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;

use super::domain::{Applicant, PlanSummary, TrackingId};
use super::status::StatusValue;

/// A status transition for one applicant, built by the mutation or issuance path and
/// consumed straight away by the [`NotificationDispatcher`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub application_id: TrackingId,
    pub applicant_index: usize,
    pub applicant: Applicant,
    pub previous_status: Option<StatusValue>,
    pub new_status: StatusValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visa_file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
}

/// Contact entry handed to the mail collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEntry {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
}

/// Rendered e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Request sent to the e-mail delivery collaborator; one per recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub application_id: String,
    pub tracking_id: String,
    pub status: StatusValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<StatusValue>,
    pub applicants: Vec<ContactEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visa_file_url: Option<String>,
    pub message: EmailMessage,
}

/// Outbound mail hook (SMTP relay, transactional mail API, ...).
pub trait MailTransport: Send + Sync {
    fn send(&self, request: NotificationRequest) -> Result<(), NotificationError>;
}

/// Mail dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
    #[error("mail rejected for {recipient}: {reason}")]
    Rejected { recipient: String, reason: String },
}

/// Non-fatal warning surfaced next to an already committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationWarning {
    pub recipient: String,
    pub reason: String,
}

/// Why a dispatch was skipped without being a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingRecipient,
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent { recipient: String },
    Skipped { reason: SkipReason },
    Failed(NotificationWarning),
}

impl DispatchOutcome {
    pub fn warning(&self) -> Option<&NotificationWarning> {
        match self {
            DispatchOutcome::Failed(warning) => Some(warning),
            _ => None,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }
}

/// Subject line and opening paragraph for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTemplate {
    pub status: StatusValue,
    pub subject: &'static str,
    pub opening: &'static str,
}

impl MessageTemplate {
    pub const fn for_status(status: StatusValue) -> Self {
        let (subject, opening) = match status {
            StatusValue::Draft => (
                "Your visa application has been saved",
                "Your application has been saved as a draft. You can come back at any time to complete the remaining details.",
            ),
            StatusValue::Pending => (
                "Your visa application is awaiting completion",
                "We are waiting for a few remaining details or documents before your application can be submitted.",
            ),
            StatusValue::Submitted => (
                "We have received your visa application",
                "Thank you, your application has been submitted and is queued for review by our team.",
            ),
            StatusValue::Paid => (
                "Payment confirmed for your visa application",
                "We have received your payment. Your application will now be prepared for lodgement.",
            ),
            StatusValue::Processing => (
                "Your visa application is being processed",
                "Your application has been lodged and is currently being processed by the issuing authority.",
            ),
            StatusValue::Issued => (
                "Your visa has been issued",
                "Good news: your visa has been issued. Please keep a copy of the document with your travel papers.",
            ),
            StatusValue::Rejected => (
                "Update on your visa application",
                "Unfortunately the issuing authority has refused your application. Our team will contact you about the next steps.",
            ),
        };
        Self {
            status,
            subject,
            opening,
        }
    }
}

/// Decides whether and to whom a transition is announced, renders the message and sends it.
pub struct NotificationDispatcher<T> {
    transport: Arc<T>,
    config: NotificationConfig,
}

impl<T> NotificationDispatcher<T>
where
    T: MailTransport + 'static,
{
    pub fn new(transport: Arc<T>, config: NotificationConfig) -> Self {
        Self { transport, config }
    }

    /// Best effort: transport errors come back as [`DispatchOutcome::Failed`], never `Err`.
    pub fn dispatch(&self, event: &NotificationEvent) -> DispatchOutcome {
        let Some(recipient) = event.applicant.recipient() else {
            debug!(
                tracking_id = %event.application_id,
                applicant = event.applicant_index,
                "applicant has no e-mail address, notification skipped"
            );
            return DispatchOutcome::Skipped {
                reason: SkipReason::MissingRecipient,
            };
        };
        let recipient = recipient.to_string();

        let request = self.compose(event, &recipient);
        match self.transport.send(request) {
            Ok(()) => {
                info!(
                    tracking_id = %event.application_id,
                    applicant = event.applicant_index,
                    status = %event.new_status,
                    "status notification sent"
                );
                DispatchOutcome::Sent { recipient }
            }
            Err(err) => {
                warn!(
                    tracking_id = %event.application_id,
                    applicant = event.applicant_index,
                    error = %err,
                    "status notification failed"
                );
                DispatchOutcome::Failed(NotificationWarning {
                    recipient,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Each event is rendered and sent on its own; one failure does not stop the rest.
    pub fn dispatch_all(&self, events: &[NotificationEvent]) -> Vec<DispatchOutcome> {
        events.iter().map(|event| self.dispatch(event)).collect()
    }

    pub fn compose(&self, event: &NotificationEvent, recipient: &str) -> NotificationRequest {
        let applicant = &event.applicant;
        let contact = ContactEntry {
            name: applicant.display_name(),
            email: recipient.to_string(),
            phone: applicant.phone.clone(),
            nationality: applicant.nationality.clone(),
            passport_number: applicant.passport_number.clone(),
        };

        NotificationRequest {
            application_id: event.application_id.0.clone(),
            tracking_id: event.application_id.0.clone(),
            status: event.new_status,
            previous_status: event.previous_status,
            message: self.render(event, &contact),
            applicants: vec![contact],
            plan: event.plan.clone(),
            visa_file_url: event.visa_file_url.clone(),
        }
    }

    fn render(&self, event: &NotificationEvent, contact: &ContactEntry) -> EmailMessage {
        let template = MessageTemplate::for_status(event.new_status);
        let mut body = format!("Dear {},\n\n{}\n", contact.name, template.opening);

        if let Some(previous) = event.previous_status.filter(|p| *p != event.new_status) {
            body.push_str(&format!(
                "\nStatus: {} -> {}\n",
                previous.label(),
                event.new_status.label()
            ));
        } else {
            body.push_str(&format!("\nStatus: {}\n", event.new_status.label()));
        }

        if let Some(plan) = event.plan.as_ref().and_then(PlanSummary::describe) {
            body.push_str(&format!("Plan: {plan}\n"));
        }

        if event.new_status == StatusValue::Issued {
            if let Some(url) = event.visa_file_url.as_deref() {
                body.push_str(&format!("\nDownload your visa: {url}\n"));
            }
        }

        body.push_str(&format!(
            "\nTrack your application: {}\nReference: {}\n",
            self.config.tracking_link(event.application_id.as_str()),
            event.application_id
        ));

        EmailMessage {
            from: self.config.sender.clone(),
            to: contact.email.clone(),
            subject: template.subject.to_string(),
            body,
        }
    }
}
