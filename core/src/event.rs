//! Canonical event produced by a poll
//!
//! An [`Event`] is one normalized result of an introspection statement: a
//! poll timestamp, the tag of the statement it came from, and a map of
//! metric name to typed [`MetricValue`]. Events are built once through
//! [`EventBuilder`] and are read-only afterwards.
//!
//! # Wire shape
//!
//! ```text
//! {"@timestamp":"2024-01-01T00:00:00Z","type":"mysqlbeat","source":"status",
//!  "id":"01HV...","Threads_connected":5,"Uptime":86400}
//! ```

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Beat kind stamped on every event (the `type` field)
pub const BEAT_KIND: &str = "mysqlbeat";

/// Unique event identifier (ULID)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(ulid::Ulid);

impl EventId {
    /// Generate a new unique ID
    #[inline]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the underlying ULID
    #[inline]
    pub fn as_ulid(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Typed metric value
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// Parsed integer
    Int(i64),
    /// Parsed finite float
    Float(f64),
    /// Anything that did not parse as a number, kept verbatim
    Str(String),
}

impl MetricValue {
    /// Integer value, if this is an `Int`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, if this is a `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Type label used in logs ("int", "float", "string")
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::Int(_) => "int",
            MetricValue::Float(_) => "float",
            MetricValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Str(v) => f.write_str(v),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Int(v) => serializer.serialize_i64(*v),
            MetricValue::Float(v) => serializer.serialize_f64(*v),
            MetricValue::Str(v) => serializer.serialize_str(v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Str(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Str(v)
    }
}

/// One normalized poll result
///
/// Fields are ordered by name so two events built from the same rows
/// compare and serialize identically.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    id: EventId,
    timestamp: DateTime<Utc>,
    kind: &'static str,
    source: String,
    fields: BTreeMap<String, MetricValue>,
}

impl Event {
    /// Start building an event for `source` polled at `timestamp`
    pub fn builder(source: impl Into<String>, timestamp: DateTime<Utc>) -> EventBuilder {
        EventBuilder {
            source: source.into(),
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Unique identifier
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Poll timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Beat kind, always [`BEAT_KIND`]
    pub fn kind(&self) -> &str {
        self.kind
    }

    /// Tag of the statement this event came from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All metric fields, ordered by name
    pub fn fields(&self) -> &BTreeMap<String, MetricValue> {
        &self.fields
    }

    /// Look up a single metric
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.fields.get(name)
    }

    /// Number of metric fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the event carries no metrics
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 4))?;
        map.serialize_entry("@timestamp", &self.timestamp)?;
        map.serialize_entry("type", self.kind)?;
        map.serialize_entry("source", &self.source)?;
        map.serialize_entry("id", &self.id)?;
        for (name, value) in &self.fields {
            // Reserved envelope keys win over same-named columns
            if matches!(name.as_str(), "@timestamp" | "type" | "source" | "id") {
                continue;
            }
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Builder for [`Event`]
#[derive(Debug)]
pub struct EventBuilder {
    source: String,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, MetricValue>,
}

impl EventBuilder {
    /// Set a metric; a later value for the same name replaces the earlier one
    pub fn field(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a metric in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Number of fields set so far
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no field has been set
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Finish the event, assigning a fresh ID
    pub fn build(self) -> Event {
        Event {
            id: EventId::new(),
            timestamp: self.timestamp,
            kind: BEAT_KIND,
            source: self.source,
            fields: self.fields,
        }
    }
}
