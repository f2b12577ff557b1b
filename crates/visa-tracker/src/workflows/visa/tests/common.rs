use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::config::NotificationConfig;
use crate::workflows::visa::domain::{ApplicationPatch, TrackingId, VisaArtifact};
use crate::workflows::visa::notification::{
    MailTransport, NotificationDispatcher, NotificationError, NotificationRequest,
};
use crate::workflows::visa::repository::{ApplicationFeed, ApplicationRepository, RepositoryError};
use crate::workflows::visa::service::VisaStatusService;
use crate::workflows::visa::status::StatusValue;

pub(super) fn tracking_id() -> TrackingId {
    TrackingId("VT-2024-0042".to_string())
}

pub(super) fn applicant_json(first: &str, email: &str, status: StatusValue) -> Value {
    json!({
        "firstName": first,
        "lastName": "Okafor",
        "email": email,
        "phone": "+234 803 555 0101",
        "nationality": "NG",
        "passportNumber": format!("A{:08}", first.len()),
        "status": status.label(),
    })
}

/// Document with one applicant per status; e-mails are `<name>@example.com`.
pub(super) fn document_with(statuses: &[StatusValue]) -> Value {
    const NAMES: [&str; 4] = ["Ada", "Bayo", "Chidi", "Dami"];
    let applicants: Vec<Value> = statuses
        .iter()
        .enumerate()
        .map(|(index, status)| {
            let name = NAMES[index % NAMES.len()];
            applicant_json(name, &format!("{}@example.com", name.to_lowercase()), *status)
        })
        .collect();

    json!({
        "trackingId": tracking_id().0,
        "status": crate::workflows::visa::status::aggregate(statuses.iter().copied()).label(),
        "applicants": applicants,
        "plan": { "country": "Kenya", "visa": "Tourist eVisa", "entry": "Single", "price": 51 },
        "payment": { "provider": "card", "amount": 153 },
        "createdAt": "2024-03-05T09:07:00Z",
        "updatedAt": "2024-03-05T09:07:00Z",
    })
}

pub(super) fn artifact(name: &str) -> VisaArtifact {
    VisaArtifact {
        name: name.to_string(),
        url: format!("https://files.example.com/visas/{name}"),
        path: format!("applications/VT-2024-0042/{name}"),
        size: 48_213,
        uploaded_at: Some(Utc.with_ymd_and_hms(2024, 4, 2, 14, 30, 0).unwrap()),
    }
}

/// In-memory document store with a watch channel per document, mirroring a realtime store.
#[derive(Default)]
pub(super) struct MemoryStore {
    documents: Mutex<HashMap<TrackingId, watch::Sender<Option<Value>>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub(super) fn with_document(id: &TrackingId, document: Value) -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.insert(id, document);
        store
    }

    pub(super) fn insert(&self, id: &TrackingId, document: Value) {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        match guard.get(id) {
            Some(sender) => {
                sender.send_replace(Some(document));
            }
            None => {
                let (sender, _receiver) = watch::channel(Some(document));
                guard.insert(id.clone(), sender);
            }
        }
    }

    pub(super) fn document(&self, id: &TrackingId) -> Option<Value> {
        let guard = self.documents.lock().expect("store mutex poisoned");
        guard.get(id).and_then(|sender| sender.borrow().clone())
    }

    pub(super) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Drops the feed sender so subscribers observe a disconnect.
    pub(super) fn close_feed(&self, id: &TrackingId) {
        self.documents
            .lock()
            .expect("store mutex poisoned")
            .remove(id);
    }
}

impl ApplicationRepository for MemoryStore {
    fn fetch(&self, id: &TrackingId) -> Result<Option<Value>, RepositoryError> {
        Ok(self.document(id))
    }

    fn write(&self, id: &TrackingId, patch: &ApplicationPatch) -> Result<(), RepositoryError> {
        let guard = self.documents.lock().expect("store mutex poisoned");
        let sender = guard.get(id).ok_or(RepositoryError::NotFound)?;
        let mut document = sender.borrow().clone().ok_or(RepositoryError::NotFound)?;
        patch.apply_to(&mut document)?;
        sender.send_replace(Some(document));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ApplicationFeed for MemoryStore {
    fn subscribe(&self, id: &TrackingId) -> Result<watch::Receiver<Option<Value>>, RepositoryError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        let sender = guard
            .entry(id.clone())
            .or_insert_with(|| watch::channel(None).0);
        Ok(sender.subscribe())
    }
}

/// Reads succeed, every write fails.
pub(super) struct ReadOnlyStore {
    pub(super) inner: MemoryStore,
}

impl ReadOnlyStore {
    pub(super) fn with_document(id: &TrackingId, document: Value) -> Arc<Self> {
        let inner = MemoryStore::default();
        inner.insert(id, document);
        Arc::new(Self { inner })
    }
}

impl ApplicationRepository for ReadOnlyStore {
    fn fetch(&self, id: &TrackingId) -> Result<Option<Value>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn write(&self, _id: &TrackingId, _patch: &ApplicationPatch) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("write quota exceeded".to_string()))
    }
}

impl ApplicationFeed for ReadOnlyStore {
    fn subscribe(&self, id: &TrackingId) -> Result<watch::Receiver<Option<Value>>, RepositoryError> {
        self.inner.subscribe(id)
    }
}

#[derive(Default)]
pub(super) struct RecordingTransport {
    requests: Mutex<Vec<NotificationRequest>>,
}

impl RecordingTransport {
    pub(super) fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().expect("transport mutex poisoned").clone()
    }
}

impl MailTransport for RecordingTransport {
    fn send(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        self.requests
            .lock()
            .expect("transport mutex poisoned")
            .push(request);
        Ok(())
    }
}

pub(super) struct FailingTransport;

impl MailTransport for FailingTransport {
    fn send(&self, _request: NotificationRequest) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) fn notification_config() -> NotificationConfig {
    NotificationConfig {
        sender: "visas@example.com".to_string(),
        tracking_base_url: "https://visas.example.com/track".to_string(),
    }
}

pub(super) fn dispatcher<T: MailTransport + 'static>(
    transport: Arc<T>,
) -> NotificationDispatcher<T> {
    NotificationDispatcher::new(transport, notification_config())
}

pub(super) fn service_with(statuses: &[StatusValue]) -> (VisaStatusService<MemoryStore>, Arc<MemoryStore>) {
    let store = MemoryStore::with_document(&tracking_id(), document_with(statuses));
    (VisaStatusService::new(store.clone()), store)
}

pub(super) fn stored_statuses(store: &MemoryStore) -> Vec<String> {
    store
        .document(&tracking_id())
        .and_then(|document| document.get("applicants").cloned())
        .and_then(|applicants| applicants.as_array().cloned())
        .unwrap_or_default()
        .iter()
        .map(|applicant| {
            applicant
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
