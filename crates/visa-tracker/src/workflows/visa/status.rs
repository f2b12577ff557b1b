use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle state of a single applicant, and the cached aggregate of an application.
///
/// Variants are declared weakest to strongest; the derived `Ord` is the resolution
/// strength used for tie-breaking. `Rejected` sorts last but never competes on strength:
/// the aggregation cascade handles it before any comparison happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum StatusValue {
    #[default]
    Draft,
    Pending,
    Submitted,
    Paid,
    Processing,
    Issued,
    Rejected,
}

impl StatusValue {
    pub const ALL: [StatusValue; 7] = [
        StatusValue::Draft,
        StatusValue::Pending,
        StatusValue::Submitted,
        StatusValue::Paid,
        StatusValue::Processing,
        StatusValue::Issued,
        StatusValue::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            StatusValue::Draft => "draft",
            StatusValue::Pending => "pending",
            StatusValue::Submitted => "submitted",
            StatusValue::Paid => "paid",
            StatusValue::Processing => "processing",
            StatusValue::Issued => "issued",
            StatusValue::Rejected => "rejected",
        }
    }

    /// Strict parse for operator input. Accepts any casing and `-`/space separators.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|status| status.label() == key)
    }

    /// Lenient parse for stored data: anything unrecognised becomes `Draft`.
    pub fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }

    /// Same as [`StatusValue::normalize`] for an arbitrary JSON value; non-strings are `Draft`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        value.as_str().map(Self::normalize).unwrap_or_default()
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for StatusValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for StatusValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

/// Derive the overall status of an application from its applicants' statuses.
///
/// Cascade, first match wins:
/// 1. no applicants: `Draft`;
/// 2. any applicant `Rejected`: `Rejected`. Rejection is absorbing as a business rule:
///    one refused traveller marks the whole application refused, whatever the others'
///    progress;
/// 3. every applicant `Issued`: `Issued`. Issuance needs unanimity;
/// 4. the strongest of `Processing`, `Paid`, `Submitted`, `Pending` present;
/// 5. otherwise `Draft`.
pub fn aggregate<I>(statuses: I) -> StatusValue
where
    I: IntoIterator<Item = StatusValue>,
{
    let mut seen = 0usize;
    let mut issued = 0usize;
    let mut strongest: Option<StatusValue> = None;

    for status in statuses {
        seen += 1;
        match status {
            StatusValue::Rejected => return StatusValue::Rejected,
            StatusValue::Issued => issued += 1,
            StatusValue::Pending
            | StatusValue::Submitted
            | StatusValue::Paid
            | StatusValue::Processing => {
                strongest = Some(strongest.map_or(status, |current| current.max(status)));
            }
            StatusValue::Draft => {}
        }
    }

    if seen == 0 {
        return StatusValue::Draft;
    }
    if issued == seen {
        return StatusValue::Issued;
    }
    strongest.unwrap_or(StatusValue::Draft)
}

/// The four states a customer is shown on the tracking page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerBucket {
    Submitted,
    Paid,
    Issued,
    Rejected,
}

impl CustomerBucket {
    pub const fn label(self) -> &'static str {
        match self {
            CustomerBucket::Submitted => "submitted",
            CustomerBucket::Paid => "paid",
            CustomerBucket::Issued => "issued",
            CustomerBucket::Rejected => "rejected",
        }
    }

    pub const fn headline(self) -> &'static str {
        match self {
            CustomerBucket::Submitted => "Application received",
            CustomerBucket::Paid => "Payment confirmed, application in progress",
            CustomerBucket::Issued => "Visa issued",
            CustomerBucket::Rejected => "Application refused",
        }
    }
}

impl From<StatusValue> for CustomerBucket {
    fn from(status: StatusValue) -> Self {
        match status {
            StatusValue::Rejected => CustomerBucket::Rejected,
            StatusValue::Issued => CustomerBucket::Issued,
            StatusValue::Paid | StatusValue::Processing => CustomerBucket::Paid,
            StatusValue::Draft | StatusValue::Pending | StatusValue::Submitted => {
                CustomerBucket::Submitted
            }
        }
    }
}

/// Customer-facing overall bucket, always a projection of [`aggregate`].
pub fn customer_bucket<I>(statuses: I) -> CustomerBucket
where
    I: IntoIterator<Item = StatusValue>,
{
    CustomerBucket::from(aggregate(statuses))
}
