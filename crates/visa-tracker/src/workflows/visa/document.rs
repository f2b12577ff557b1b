//! Parsing boundary between loosely typed store documents and the typed [`Application`].
//!
//! Documents written over the years carry applicants as arrays, index-keyed objects or a
//! single object, and per-applicant statuses either inline or in parallel collections.
//! Everything is normalised here, once, so the rest of the crate only sees one shape.
//! Nothing in this module fails: unrecognised input degrades to empty lists and `draft`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::domain::{Applicant, Application, PlanSummary, TrackingId, VisaArtifact};
use super::status::StatusValue;

/// Keys older documents used for a status collection parallel to `applicants`.
const PARALLEL_STATUS_KEYS: [&str; 3] = ["applicantStatuses", "applicantsStatus", "statuses"];

const KNOWN_APPLICANT_KEYS: [&str; 8] = [
    "firstName",
    "lastName",
    "email",
    "phone",
    "nationality",
    "passportNumber",
    "status",
    "visaFile",
];

/// How the applicant list was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicantShape {
    List,
    IndexedObject,
    SingleObject,
    Missing,
}

/// Where the per-applicant statuses were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Inline,
    ParallelCollection,
    ApplicationLevel,
    Absent,
}

/// A stored document after normalisation, tagged with how it was shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedApplication {
    /// Normalised application with `status` recomputed from the applicants.
    pub application: Application,
    /// The cached aggregate exactly as the document carried it.
    pub stored_status: StatusValue,
    pub applicant_shape: ApplicantShape,
    pub status_source: StatusSource,
}

impl ParsedApplication {
    pub fn from_document(tracking_id: &TrackingId, document: &Value) -> Self {
        let empty = Map::new();
        let fields = document.as_object().unwrap_or(&empty);

        let stored_status = fields
            .get("status")
            .map(StatusValue::from_json)
            .unwrap_or_default();

        let (raw_applicants, applicant_shape) = applicant_entries(fields);
        let parallel = parallel_statuses(fields);

        let inline_present = raw_applicants
            .iter()
            .any(|(_, raw)| inline_status(raw).is_some());
        let parallel_present = parallel.as_ref().is_some_and(|entries| !entries.is_empty());
        let legacy_status = fields.get("status").filter(|value| !value.is_null());

        let status_source = if inline_present {
            StatusSource::Inline
        } else if parallel_present {
            StatusSource::ParallelCollection
        } else if legacy_status.is_some() {
            StatusSource::ApplicationLevel
        } else {
            StatusSource::Absent
        };

        let applicants = raw_applicants
            .iter()
            .map(|(index, raw)| {
                let mut applicant = parse_applicant(raw);
                applicant.status = match inline_status(raw) {
                    Some(status) => StatusValue::from_json(status),
                    None => match parallel.as_ref().and_then(|entries| entries.get(index)) {
                        Some(status) => StatusValue::from_json(status),
                        None if status_source == StatusSource::ApplicationLevel => stored_status,
                        None => StatusValue::Draft,
                    },
                };
                applicant
            })
            .collect::<Vec<_>>();

        // The store key is authoritative; a `trackingId` field inside the body is not.
        let mut application = Application::new(tracking_id.clone(), applicants);
        application.visa_file = fields.get("visaFile").and_then(parse_artifact);
        application.plan = fields
            .get("plan")
            .filter(|plan| plan.is_object())
            .and_then(|plan| serde_json::from_value::<PlanSummary>(plan.clone()).ok());
        application.payment = fields
            .get("payment")
            .or_else(|| fields.get("paymentSummary"))
            .filter(|payment| !payment.is_null())
            .cloned();
        application.created_at = fields.get("createdAt").and_then(parse_timestamp);
        application.updated_at = fields.get("updatedAt").and_then(parse_timestamp);

        Self {
            application,
            stored_status,
            applicant_shape,
            status_source,
        }
    }

    /// The cached aggregate disagrees with the applicants, e.g. after an out-of-band write.
    pub fn drifted(&self) -> bool {
        self.stored_status != self.application.status
    }

    pub fn into_application(self) -> Application {
        self.application
    }
}

/// Raw applicant entries paired with their stored index. Index-keyed objects keep their
/// keys, so gaps line up with index-keyed parallel status collections.
fn applicant_entries(fields: &Map<String, Value>) -> (Vec<(usize, Value)>, ApplicantShape) {
    let raw = fields
        .get("applicants")
        .filter(|value| !value.is_null())
        .or_else(|| fields.get("applicant").filter(|value| value.is_object()));

    match raw {
        Some(Value::Array(entries)) => (
            entries.iter().cloned().enumerate().collect(),
            ApplicantShape::List,
        ),
        Some(Value::Object(map)) if map.is_empty() => (Vec::new(), ApplicantShape::Missing),
        Some(Value::Object(map)) => match indexed_entries(map) {
            Some(entries) => (entries.into_iter().collect(), ApplicantShape::IndexedObject),
            None => (
                vec![(0, Value::Object(map.clone()))],
                ApplicantShape::SingleObject,
            ),
        },
        _ => (Vec::new(), ApplicantShape::Missing),
    }
}

/// `{"0": .., "1": ..}` style maps, ordered by index. `None` when any key is not an index.
fn indexed_entries(map: &Map<String, Value>) -> Option<BTreeMap<usize, Value>> {
    if map.is_empty() {
        return None;
    }
    map.iter()
        .map(|(key, value)| key.trim().parse::<usize>().ok().map(|index| (index, value.clone())))
        .collect()
}

fn parallel_statuses(fields: &Map<String, Value>) -> Option<BTreeMap<usize, Value>> {
    PARALLEL_STATUS_KEYS
        .iter()
        .find_map(|key| match fields.get(*key) {
            Some(Value::Array(entries)) => Some(entries.iter().cloned().enumerate().collect()),
            Some(Value::Object(map)) => indexed_entries(map),
            _ => None,
        })
}

fn inline_status(raw: &Value) -> Option<&Value> {
    raw.get("status").filter(|status| !status.is_null())
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    }
}

fn parse_applicant(raw: &Value) -> Applicant {
    let Some(fields) = raw.as_object() else {
        return Applicant::default();
    };

    let mut extra: BTreeMap<String, Value> = fields
        .iter()
        .filter(|(key, _)| !KNOWN_APPLICANT_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    // An unusable artifact record is carried through untouched rather than dropped on write.
    let raw_visa_file = fields.get("visaFile").filter(|value| !value.is_null());
    let visa_file = raw_visa_file.and_then(parse_artifact);
    if let (None, Some(raw)) = (&visa_file, raw_visa_file) {
        extra.insert("visaFile".to_string(), raw.clone());
    }

    Applicant {
        first_name: text(fields, "firstName"),
        last_name: text(fields, "lastName"),
        email: text(fields, "email"),
        phone: text(fields, "phone"),
        nationality: text(fields, "nationality"),
        passport_number: text(fields, "passportNumber"),
        status: StatusValue::Draft,
        visa_file,
        extra,
    }
}

/// Artifact records without a usable URL are treated as absent.
pub(crate) fn parse_artifact(raw: &Value) -> Option<VisaArtifact> {
    let fields = raw.as_object()?;
    let url = text(fields, "url")
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())?;

    let size = match fields.get("size") {
        Some(Value::Number(size)) => size.as_u64().unwrap_or(0),
        Some(Value::String(size)) => size.trim().parse().unwrap_or(0),
        _ => 0,
    };

    Some(VisaArtifact {
        name: text(fields, "name").unwrap_or_else(|| "visa".to_string()),
        url,
        path: text(fields, "path").unwrap_or_default(),
        size,
        uploaded_at: fields.get("uploadedAt").and_then(parse_timestamp),
    })
}

/// RFC 3339 strings, epoch milliseconds, or `{seconds, nanoseconds}` store timestamps.
pub(crate) fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(value) => {
            let value = value.trim();
            DateTime::parse_from_rfc3339(value)
                .map(|parsed| parsed.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(value) => value
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(fields) => {
            let seconds = fields
                .get("seconds")
                .or_else(|| fields.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = fields
                .get("nanoseconds")
                .or_else(|| fields.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .and_then(|nanos| u32::try_from(nanos).ok())
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos).single()
        }
        _ => None,
    }
}
