//! Domain types shared by the write path, the read path and the bucketizer.

use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Event severity, ordered from least to most severe.
///
/// The derived `Ord` follows declaration order, so `Severity::Fatal > Severity::Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Name as stored in the `events.severity` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// True if `self` is strictly more severe than `other`.
    ///
    /// Any severity is more severe than "no data".
    pub fn is_more_severe_than(&self, other: Option<Severity>) -> bool {
        match other {
            None => true,
            Some(other) => *self > other,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            other => Err(EventError::InvalidArgument(format!(
                "unknown severity '{}'",
                other
            ))),
        }
    }
}

/// Identity of an event source as reported by an endpoint.
///
/// The numeric id of the event definition is never known to the reporter, so
/// the definition is named by `(definition, endpoint_type, namespace)` and
/// resolved inside SQL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventSourceKey {
    pub definition: String,
    pub endpoint_type: String,
    pub namespace: String,
    pub endpoint_id: i64,
    /// Sub-location such as a log file path; may be empty
    #[serde(default)]
    pub location: String,
}

impl EventSourceKey {
    pub fn new(
        definition: impl Into<String>,
        endpoint_type: impl Into<String>,
        namespace: impl Into<String>,
        endpoint_id: i64,
        location: impl Into<String>,
    ) -> Self {
        Self {
            definition: definition.into(),
            endpoint_type: endpoint_type.into(),
            namespace: namespace.into(),
            endpoint_id,
            location: location.into(),
        }
    }
}

impl fmt::Display for EventSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}@{}[{}]",
            self.namespace, self.endpoint_type, self.definition, self.endpoint_id, self.location
        )
    }
}

/// A single reported occurrence, before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unix milliseconds
    pub timestamp: i64,
    pub severity: Severity,
    pub detail: String,
}

impl EventRecord {
    pub fn new(timestamp: i64, severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            timestamp,
            severity,
            detail: detail.into(),
        }
    }
}

/// Events grouped by the source that reported them.
pub type EventBatch = BTreeMap<EventSourceKey, BTreeSet<EventRecord>>;

/// Denormalized read model joining event, source and endpoint display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventComposite {
    pub detail: String,
    pub event_id: i64,
    pub location: String,
    pub severity: Severity,
    pub timestamp: i64,
    pub endpoint_id: i64,
    pub endpoint_name: Option<String>,
}

/// The minimum an event needs for timeline bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPoint {
    pub timestamp: i64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrdering {
    #[default]
    Asc,
    Desc,
}

impl PageOrdering {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` argument requested by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingField {
    pub field: String,
    #[serde(default)]
    pub ordering: PageOrdering,
}

impl OrderingField {
    pub fn new(field: impl Into<String>, ordering: PageOrdering) -> Self {
        Self {
            field: field.into(),
            ordering,
        }
    }
}

/// Offset/limit paging plus requested ordering.
///
/// `limit: None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageControl {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub ordering: Vec<OrderingField>,
}

impl PageControl {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
            ordering: Vec::new(),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: impl Into<String>, ordering: PageOrdering) -> Self {
        self.ordering.push(OrderingField::new(field, ordering));
        self
    }

    pub fn is_paged(&self) -> bool {
        self.offset > 0 || self.limit.is_some()
    }
}

impl fmt::Display for PageControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ordering: Vec<String> = self
            .ordering
            .iter()
            .map(|o| format!("{} {}", o.field, o.ordering.as_sql()))
            .collect();
        match self.limit {
            Some(limit) => write!(
                f,
                "PageControl[offset={}, limit={}, ordering=[{}]]",
                self.offset,
                limit,
                ordering.join(", ")
            ),
            None => write!(
                f,
                "PageControl[offset={}, limit=unlimited, ordering=[{}]]",
                self.offset,
                ordering.join(", ")
            ),
        }
    }
}

/// A page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total_rows: u64,
    pub page_control: PageControl,
}

impl<T> Page<T> {
    pub fn empty(page_control: PageControl) -> Self {
        Self {
            rows: Vec::new(),
            total_rows: 0,
            page_control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Fatal));
    }

    #[test]
    fn test_more_severe_than_no_data() {
        assert!(Severity::Debug.is_more_severe_than(None));
        assert!(Severity::Error.is_more_severe_than(Some(Severity::Info)));
        assert!(!Severity::Info.is_more_severe_than(Some(Severity::Info)));
        assert!(!Severity::Warn.is_more_severe_than(Some(Severity::Fatal)));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("error".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!(" WARNING ".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serde_uses_column_names() {
        let json = serde_json::to_string(&Severity::Fatal).unwrap();
        assert_eq!(json, "\"FATAL\"");
        let parsed: Severity = serde_json::from_str("\"INFO\"").unwrap();
        assert_eq!(parsed, Severity::Info);
    }

    #[test]
    fn test_event_batch_deduplicates_records() {
        let key = EventSourceKey::new("logEntry", "Linux", "platform", 7, "/var/log/messages");
        let mut batch = EventBatch::new();
        let entry = batch.entry(key).or_default();
        entry.insert(EventRecord::new(1000, Severity::Info, "started"));
        entry.insert(EventRecord::new(1000, Severity::Info, "started"));
        entry.insert(EventRecord::new(2000, Severity::Info, "started"));
        assert_eq!(batch.values().next().unwrap().len(), 2);
    }

    #[test]
    fn test_page_control_display() {
        let pc = PageControl::new(20, 10).order_by("timestamp", PageOrdering::Desc);
        assert_eq!(
            pc.to_string(),
            "PageControl[offset=20, limit=10, ordering=[timestamp DESC]]"
        );
        assert!(!PageControl::unlimited().is_paged());
    }
}
