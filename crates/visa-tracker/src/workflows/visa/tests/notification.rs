use std::collections::HashSet;
use std::sync::Arc;

use super::common::*;
use crate::workflows::visa::document::ParsedApplication;
use crate::workflows::visa::domain::Applicant;
use crate::workflows::visa::notification::{
    DispatchOutcome, MessageTemplate, NotificationEvent, SkipReason,
};
use crate::workflows::visa::status::StatusValue;

fn event_for(index: usize, new_status: StatusValue) -> NotificationEvent {
    let application = ParsedApplication::from_document(
        &tracking_id(),
        &document_with(&[StatusValue::Paid, StatusValue::Paid]),
    )
    .into_application();

    NotificationEvent {
        application_id: tracking_id(),
        applicant_index: index,
        applicant: application.applicants[index].clone(),
        previous_status: Some(StatusValue::Paid),
        new_status,
        visa_file_url: None,
        plan: application.plan.clone(),
    }
}

#[test]
fn sends_one_request_to_exactly_the_target_applicant() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone());

    let outcome = dispatcher.dispatch(&event_for(1, StatusValue::Processing));

    assert_eq!(
        outcome,
        DispatchOutcome::Sent {
            recipient: "bayo@example.com".to_string()
        }
    );
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.applicants.len(), 1);
    assert_eq!(request.applicants[0].email, "bayo@example.com");
    assert_eq!(request.message.to, "bayo@example.com");
    assert_eq!(request.message.from, "visas@example.com");
    assert_eq!(request.status, StatusValue::Processing);
    assert_eq!(request.previous_status, Some(StatusValue::Paid));
    assert_eq!(request.tracking_id, tracking_id().0);
    assert!(request.message.body.contains("Dear Bayo Okafor"));
    assert!(request
        .message
        .body
        .contains("https://visas.example.com/track/VT-2024-0042"));
    assert!(request.message.body.contains("Plan: Kenya / Tourist eVisa / Single"));
}

#[test]
fn blank_email_is_skipped_silently() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone());
    let mut event = event_for(0, StatusValue::Submitted);
    event.applicant.email = Some("   ".to_string());

    assert_eq!(
        dispatcher.dispatch(&event),
        DispatchOutcome::Skipped {
            reason: SkipReason::MissingRecipient
        }
    );

    event.applicant = Applicant::default();
    assert!(matches!(
        dispatcher.dispatch(&event),
        DispatchOutcome::Skipped { .. }
    ));
    assert!(transport.requests().is_empty());
}

#[test]
fn issued_message_links_the_document() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone());
    let mut event = event_for(0, StatusValue::Issued);
    event.visa_file_url = Some("https://files.example.com/visas/ada.pdf".to_string());

    dispatcher.dispatch(&event);

    let request = &transport.requests()[0];
    assert_eq!(request.message.subject, "Your visa has been issued");
    assert!(request
        .message
        .body
        .contains("Download your visa: https://files.example.com/visas/ada.pdf"));
    assert_eq!(
        request.visa_file_url.as_deref(),
        Some("https://files.example.com/visas/ada.pdf")
    );
}

#[test]
fn non_issued_messages_never_carry_a_download_link() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone());
    let mut event = event_for(0, StatusValue::Rejected);
    event.visa_file_url = Some("https://files.example.com/visas/stale.pdf".to_string());

    dispatcher.dispatch(&event);

    assert!(!transport.requests()[0].message.body.contains("Download"));
}

#[test]
fn every_status_has_its_own_template() {
    let subjects: HashSet<_> = StatusValue::ALL
        .iter()
        .map(|status| MessageTemplate::for_status(*status).subject)
        .collect();
    let openings: HashSet<_> = StatusValue::ALL
        .iter()
        .map(|status| MessageTemplate::for_status(*status).opening)
        .collect();

    assert_eq!(subjects.len(), StatusValue::ALL.len());
    assert_eq!(openings.len(), StatusValue::ALL.len());
}

#[test]
fn transport_failure_is_a_warning_not_an_error() {
    let dispatcher = dispatcher(Arc::new(FailingTransport));

    let outcome = dispatcher.dispatch(&event_for(0, StatusValue::Paid));

    let warning = outcome.warning().expect("failure reported as warning");
    assert_eq!(warning.recipient, "ada@example.com");
    assert!(warning.reason.contains("smtp relay offline"));
    assert!(!outcome.is_sent());
}

#[test]
fn batch_dispatch_keeps_recipients_apart() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone());

    let outcomes = dispatcher.dispatch_all(&[
        event_for(0, StatusValue::Processing),
        event_for(1, StatusValue::Rejected),
    ]);

    assert!(outcomes.iter().all(DispatchOutcome::is_sent));
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    assert_eq!(requests[0].message.to, "ada@example.com");
    assert_eq!(requests[0].status, StatusValue::Processing);
    assert!(!requests[0].message.body.contains("Bayo"));

    assert_eq!(requests[1].message.to, "bayo@example.com");
    assert_eq!(requests[1].status, StatusValue::Rejected);
    assert!(!requests[1].message.body.contains("Ada"));
    assert!(requests[1]
        .applicants
        .iter()
        .all(|contact| contact.email == "bayo@example.com"));
}
