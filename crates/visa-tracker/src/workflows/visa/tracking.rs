use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::document::{ParsedApplication, StatusSource};
use super::domain::TrackingId;
use super::repository::{ApplicationFeed, RepositoryError};
use super::status::CustomerBucket;

const TIMESTAMP_FORMAT: &str = "%d %b %Y, %H:%M UTC";

/// Customer-safe view of an application, keyed by tracking id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingView {
    pub tracking_id: TrackingId,
    pub status: CustomerBucket,
    pub headline: &'static str,
    pub applicants: Vec<TrackingApplicantRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingApplicantRow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
    pub status: CustomerBucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

/// What the tracking page shows after each feed update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "view", rename_all = "snake_case")]
pub enum TrackingState {
    Loaded(TrackingView),
    NotFound,
    /// The feed closed; the viewer should offer a retry.
    Disconnected,
}

/// Read-only projection from stored documents to [`TrackingView`]. Never writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingProjector;

impl TrackingProjector {
    pub fn project(parsed: &ParsedApplication) -> TrackingView {
        let application = &parsed.application;

        // Documents predating per-applicant statuses only carry the application-level one.
        let overall = if application.applicants.is_empty()
            && parsed.status_source == StatusSource::ApplicationLevel
        {
            parsed.stored_status
        } else {
            application.status
        };

        let applicants = application
            .applicants
            .iter()
            .map(|applicant| TrackingApplicantRow {
                name: applicant.display_name(),
                passport_number: applicant
                    .passport_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|passport| !passport.is_empty())
                    .map(str::to_string),
                status: CustomerBucket::from(applicant.status),
                document_url: applicant
                    .visa_file
                    .as_ref()
                    .map(|artifact| artifact.url.clone()),
            })
            .collect();

        let status = CustomerBucket::from(overall);
        TrackingView {
            tracking_id: application.tracking_id.clone(),
            status,
            headline: status.headline(),
            applicants,
            created: application.created_at.map(human_timestamp),
            updated: application.updated_at.map(human_timestamp),
        }
    }

    pub fn project_document(id: &TrackingId, document: Option<&Value>) -> TrackingState {
        match document {
            Some(document) => {
                TrackingState::Loaded(Self::project(&ParsedApplication::from_document(id, document)))
            }
            None => TrackingState::NotFound,
        }
    }

    pub fn subscribe<F>(feed: &F, id: &TrackingId) -> Result<TrackingSubscription, RepositoryError>
    where
        F: ApplicationFeed + ?Sized,
    {
        let receiver = feed.subscribe(id)?;
        Ok(TrackingSubscription {
            id: id.clone(),
            receiver,
            primed: false,
        })
    }
}

/// Live tracking view driven by the store's feed.
pub struct TrackingSubscription {
    id: TrackingId,
    receiver: watch::Receiver<Option<Value>>,
    primed: bool,
}

impl TrackingSubscription {
    pub fn tracking_id(&self) -> &TrackingId {
        &self.id
    }

    /// The current state on first call, then the state after each subsequent store update.
    pub async fn next(&mut self) -> TrackingState {
        if self.primed {
            if self.receiver.changed().await.is_err() {
                return TrackingState::Disconnected;
            }
        } else {
            self.primed = true;
        }

        let document = self.receiver.borrow_and_update().clone();
        TrackingProjector::project_document(&self.id, document.as_ref())
    }
}

fn human_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

