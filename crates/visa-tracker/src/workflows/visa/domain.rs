use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::{aggregate, StatusValue};

/// Opaque tracking identifier handed to the customer; also the document key in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackingId(pub String);

impl TrackingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to an issued visa document already stored by the blob storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisaArtifact {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// One traveller inside an application.
///
/// Only `email` and `status` carry meaning here; the remaining contact fields are passed
/// through to notifications and the tracking page. Fields this crate does not know about
/// are kept in `extra` so a write never drops data added by the intake forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub status: StatusValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visa_file: Option<VisaArtifact>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Applicant {
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            "Applicant".to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Attach an issued document, replacing any unparseable record carried in `extra`.
    pub fn attach_visa(&mut self, artifact: VisaArtifact) {
        self.extra.remove("visaFile");
        self.visa_file = Some(artifact);
    }

    /// Trimmed e-mail address, `None` when absent or blank.
    pub fn recipient(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Plan purchased during intake. Read-only here; only surfaced in notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PlanSummary {
    pub fn describe(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.country.as_deref(),
            self.visa.as_deref(),
            self.entry.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect();

        (!parts.is_empty()).then(|| parts.join(" / "))
    }
}

/// The aggregate root a customer tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub tracking_id: TrackingId,
    /// Cached aggregate; recomputable from `applicants` at any time.
    pub status: StatusValue,
    pub applicants: Vec<Applicant>,
    /// Legacy application-level document, only present once every applicant is issued.
    pub visa_file: Option<VisaArtifact>,
    pub plan: Option<PlanSummary>,
    pub payment: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn new(tracking_id: TrackingId, applicants: Vec<Applicant>) -> Self {
        let status = aggregate(applicants.iter().map(|applicant| applicant.status));
        Self {
            tracking_id,
            status,
            applicants,
            visa_file: None,
            plan: None,
            payment: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn derived_status(&self) -> StatusValue {
        aggregate(self.applicants.iter().map(|applicant| applicant.status))
    }

    pub(crate) fn refresh_status(&mut self) -> StatusValue {
        self.status = self.derived_status();
        self.status
    }
}

/// The single logical write issued by the mutation and issuance paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationPatch {
    pub applicants: Vec<Applicant>,
    pub status: StatusValue,
    pub updated_at: DateTime<Utc>,
    /// Only set by issuance, and only when every applicant is issued.
    pub visa_file: Option<VisaArtifact>,
}

impl ApplicationPatch {
    pub fn from_application(application: &Application, updated_at: DateTime<Utc>) -> Self {
        Self {
            applicants: application.applicants.clone(),
            status: application.status,
            updated_at,
            visa_file: None,
        }
    }

    /// Merge this patch into a stored document, leaving every other field untouched.
    pub fn apply_to(&self, document: &mut Value) -> Result<(), serde_json::Error> {
        if !document.is_object() {
            *document = Value::Object(serde_json::Map::new());
        }
        let applicants = serde_json::to_value(&self.applicants)?;
        let visa_file = self.visa_file.as_ref().map(serde_json::to_value).transpose()?;

        if let Some(fields) = document.as_object_mut() {
            fields.insert("applicants".into(), applicants);
            fields.insert("status".into(), Value::String(self.status.label().into()));
            fields.insert(
                "updatedAt".into(),
                Value::String(self.updated_at.to_rfc3339()),
            );
            if let Some(visa_file) = visa_file {
                fields.insert("visaFile".into(), visa_file);
            }
        }
        Ok(())
    }
}
