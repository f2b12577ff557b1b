use serde_json::json;

use super::common::*;
use crate::workflows::visa::document::ParsedApplication;
use crate::workflows::visa::domain::TrackingId;
use crate::workflows::visa::status::{CustomerBucket, StatusValue};
use crate::workflows::visa::tracking::{TrackingProjector, TrackingState};

#[test]
fn processing_mix_is_shown_as_paid() {
    let parsed = ParsedApplication::from_document(
        &tracking_id(),
        &document_with(&[StatusValue::Processing, StatusValue::Paid]),
    );

    let view = TrackingProjector::project(&parsed);

    assert_eq!(view.status, CustomerBucket::Paid);
    assert_eq!(view.headline, CustomerBucket::Paid.headline());
    assert_eq!(view.applicants.len(), 2);
    assert_eq!(view.applicants[0].name, "Ada Okafor");
    assert_eq!(view.applicants[0].passport_number.as_deref(), Some("A00000003"));
    assert_eq!(view.applicants[0].status, CustomerBucket::Paid);
}

#[test]
fn rows_link_issued_documents() {
    let mut document = document_with(&[StatusValue::Issued, StatusValue::Submitted]);
    document["applicants"][0]["visaFile"] = json!({
        "name": "ada.pdf",
        "url": "https://files.example.com/visas/ada.pdf",
    });

    let view = TrackingProjector::project(&ParsedApplication::from_document(&tracking_id(), &document));

    assert_eq!(view.status, CustomerBucket::Submitted);
    assert_eq!(view.applicants[0].status, CustomerBucket::Issued);
    assert_eq!(
        view.applicants[0].document_url.as_deref(),
        Some("https://files.example.com/visas/ada.pdf")
    );
    assert!(view.applicants[1].document_url.is_none());
}

#[test]
fn timestamps_are_human_readable() {
    let view = TrackingProjector::project(&ParsedApplication::from_document(
        &tracking_id(),
        &document_with(&[StatusValue::Submitted]),
    ));

    assert_eq!(view.created.as_deref(), Some("05 Mar 2024, 09:07 UTC"));
    assert_eq!(view.updated.as_deref(), Some("05 Mar 2024, 09:07 UTC"));
}

#[test]
fn legacy_document_without_applicants_uses_application_status() {
    let document = json!({ "status": "Issued" });

    let view = TrackingProjector::project(&ParsedApplication::from_document(&tracking_id(), &document));

    assert_eq!(view.status, CustomerBucket::Issued);
    assert!(view.applicants.is_empty());
}

#[test]
fn missing_document_projects_to_not_found() {
    assert_eq!(
        TrackingProjector::project_document(&tracking_id(), None),
        TrackingState::NotFound
    );
}

#[tokio::test]
async fn subscription_follows_every_write() {
    let (service, store) = service_with(&[StatusValue::Paid, StatusValue::Paid]);
    let mut subscription =
        TrackingProjector::subscribe(store.as_ref(), &tracking_id()).expect("subscribed");

    match subscription.next().await {
        TrackingState::Loaded(view) => assert_eq!(view.status, CustomerBucket::Paid),
        other => panic!("expected loaded view, got {other:?}"),
    }

    service
        .set_applicant_status(&tracking_id(), 0, StatusValue::Rejected)
        .expect("status saved");

    match subscription.next().await {
        TrackingState::Loaded(view) => {
            assert_eq!(view.status, CustomerBucket::Rejected);
            assert_eq!(view.applicants[0].status, CustomerBucket::Rejected);
        }
        other => panic!("expected loaded view, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_id_waits_for_creation() {
    let store = MemoryStore::with_document(&tracking_id(), document_with(&[StatusValue::Paid]));
    let id = TrackingId("VT-LATE".to_string());
    let mut subscription = TrackingProjector::subscribe(store.as_ref(), &id).expect("subscribed");

    assert_eq!(subscription.next().await, TrackingState::NotFound);

    store.insert(&id, document_with(&[StatusValue::Submitted]));
    match subscription.next().await {
        TrackingState::Loaded(view) => {
            assert_eq!(view.tracking_id, id);
            assert_eq!(view.status, CustomerBucket::Submitted);
        }
        other => panic!("expected loaded view, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_feed_reports_disconnect() {
    let (_service, store) = service_with(&[StatusValue::Paid]);
    let mut subscription =
        TrackingProjector::subscribe(store.as_ref(), &tracking_id()).expect("subscribed");
    assert!(matches!(subscription.next().await, TrackingState::Loaded(_)));

    store.close_feed(&tracking_id());

    assert_eq!(subscription.next().await, TrackingState::Disconnected);
}
