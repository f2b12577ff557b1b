use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::info;
use visa_tracker::workflows::visa::{
    ApplicationFeed, ApplicationPatch, ApplicationRepository, MailTransport, NotificationError,
    NotificationRequest, RepositoryError, StatusValue, TrackingId,
};

pub(crate) const SAMPLE_TRACKING_ID: &str = "VT-DEMO-0001";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Document store kept in process memory. Every document owns a watch channel so tracking
/// subscribers see writes as they land.
#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationStore {
    documents: Arc<Mutex<HashMap<TrackingId, watch::Sender<Option<Value>>>>>,
}

impl InMemoryApplicationStore {
    pub(crate) fn seed(&self, id: TrackingId, document: Value) {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        match guard.get(&id) {
            Some(sender) => {
                sender.send_replace(Some(document));
            }
            None => {
                guard.insert(id, watch::channel(Some(document)).0);
            }
        }
    }
}

impl ApplicationRepository for InMemoryApplicationStore {
    fn fetch(&self, id: &TrackingId) -> Result<Option<Value>, RepositoryError> {
        let guard = self.documents.lock().expect("store mutex poisoned");
        Ok(guard.get(id).and_then(|sender| sender.borrow().clone()))
    }

    fn write(&self, id: &TrackingId, patch: &ApplicationPatch) -> Result<(), RepositoryError> {
        let guard = self.documents.lock().expect("store mutex poisoned");
        let sender = guard.get(id).ok_or(RepositoryError::NotFound)?;
        let mut document = sender.borrow().clone().ok_or(RepositoryError::NotFound)?;
        patch.apply_to(&mut document)?;
        sender.send_replace(Some(document));
        Ok(())
    }
}

impl ApplicationFeed for InMemoryApplicationStore {
    fn subscribe(&self, id: &TrackingId) -> Result<watch::Receiver<Option<Value>>, RepositoryError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        let sender = guard
            .entry(id.clone())
            .or_insert_with(|| watch::channel(None).0);
        Ok(sender.subscribe())
    }
}

/// Mail transport that logs instead of delivering; sent requests are kept for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingMailTransport {
    sent: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl LoggingMailTransport {
    pub(crate) fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().expect("mail mutex poisoned").clone()
    }
}

impl MailTransport for LoggingMailTransport {
    fn send(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        info!(
            tracking_id = %request.tracking_id,
            to = %request.message.to,
            subject = %request.message.subject,
            "outbound status e-mail"
        );
        self.sent.lock().expect("mail mutex poisoned").push(request);
        Ok(())
    }
}

/// A family travel application with one applicant per status.
pub(crate) fn sample_document(id: &TrackingId, statuses: &[StatusValue]) -> Value {
    const TRAVELLERS: [(&str, &str); 4] = [
        ("Amara", "Nwosu"),
        ("Kelechi", "Nwosu"),
        ("Ifeoma", "Nwosu"),
        ("Obinna", "Nwosu"),
    ];

    let applicants: Vec<Value> = statuses
        .iter()
        .zip(TRAVELLERS.iter().cycle())
        .enumerate()
        .map(|(index, (status, (first, last)))| {
            json!({
                "firstName": first,
                "lastName": last,
                "email": format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()),
                "nationality": "NG",
                "passportNumber": format!("B{:07}", 4_410_020 + index),
                "status": status.label(),
            })
        })
        .collect();

    let now = Utc::now().to_rfc3339();
    json!({
        "trackingId": id.as_str(),
        "status": visa_tracker::workflows::visa::aggregate(statuses.iter().copied()).label(),
        "applicants": applicants,
        "plan": { "country": "Kenya", "visa": "Tourist eVisa", "entry": "Single", "price": 51 },
        "createdAt": now,
        "updatedAt": now,
    })
}
