use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{HarvesterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }

    /// Name of the wire field that carries this kind's payload.
    pub fn payload_field(&self) -> &'static str {
        match self {
            Self::Gauge => "value",
            Self::Counter => "delta",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = HarvesterError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(HarvesterError::UnknownMetricKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for MetricKind {
    type Error = HarvesterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A metric name that is non-empty and made of letters and digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(String);

impl MetricId {
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(HarvesterError::InvalidMetricId("empty metric id".to_string()));
        }
        if !id.chars().all(is_id_char) {
            return Err(HarvesterError::InvalidMetricId(format!(
                "{id} should contain letters or digits only"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

// Letters and decimal digits. Letter-like numerals (Ⅻ) and other numerics (²) are rejected.
fn is_id_char(c: char) -> bool {
    c.is_ascii_digit() || (c.is_alphabetic() && !c.is_numeric())
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MetricId {
    type Err = HarvesterError;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl AsRef<str> for MetricId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// JSON record exchanged between agent and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }
}

/// A record that passed id and payload validation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    Gauge { id: MetricId, value: f64 },
    Counter { id: MetricId, delta: i64 },
}

impl MetricUpdate {
    /// Builds an update from the `/update/{type}/{name}/{value}` path segments.
    pub fn from_segments(kind: &str, id: &str, raw_value: &str) -> Result<Self> {
        let kind = kind.parse::<MetricKind>()?;
        let id = MetricId::parse(id)?;
        let invalid = || HarvesterError::InvalidValue {
            kind,
            value: raw_value.to_string(),
        };

        match kind {
            MetricKind::Gauge => {
                let value = raw_value.parse::<f64>().map_err(|_| invalid())?;
                Self::gauge(id, value)
            }
            MetricKind::Counter => {
                let delta = raw_value.parse::<i64>().map_err(|_| invalid())?;
                Ok(Self::Counter { id, delta })
            }
        }
    }

    pub fn from_record(record: &MetricRecord) -> Result<Self> {
        let id = MetricId::parse(record.id.as_str())?;
        let missing = || HarvesterError::MissingValue {
            kind: record.kind,
            id: record.id.clone(),
        };

        match record.kind {
            MetricKind::Gauge => Self::gauge(id, record.value.ok_or_else(missing)?),
            MetricKind::Counter => Ok(Self::Counter {
                id,
                delta: record.delta.ok_or_else(missing)?,
            }),
        }
    }

    pub fn id(&self) -> &MetricId {
        match self {
            Self::Gauge { id, .. } | Self::Counter { id, .. } => id,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge { .. } => MetricKind::Gauge,
            Self::Counter { .. } => MetricKind::Counter,
        }
    }

    fn gauge(id: MetricId, value: f64) -> Result<Self> {
        Ok(Self::Gauge {
            id,
            value: finite_gauge(value)?,
        })
    }
}

/// NaN and infinities have no JSON representation and would not survive a snapshot.
pub fn finite_gauge(value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(HarvesterError::InvalidValue {
            kind: MetricKind::Gauge,
            value: value.to_string(),
        });
    }
    Ok(value)
}

impl TryFrom<&MetricRecord> for MetricUpdate {
    type Error = HarvesterError;

    fn try_from(record: &MetricRecord) -> Result<Self> {
        Self::from_record(record)
    }
}

/// Complete store state at one instant. Also the on-disk layout of the file backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Gauges", default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(rename = "Counters", default)]
    pub counters: BTreeMap<String, i64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Rejects snapshots carrying ids that could never have been written through validation.
    pub fn validate(&self) -> Result<()> {
        for id in self.gauges.keys().chain(self.counters.keys()) {
            MetricId::parse(id.as_str())?;
        }
        Ok(())
    }

    /// Gauges first, then counters, each in name order.
    pub fn to_records(&self) -> Vec<MetricRecord> {
        let gauges = self
            .gauges
            .iter()
            .map(|(id, value)| MetricRecord::gauge(id.as_str(), *value));
        let counters = self
            .counters
            .iter()
            .map(|(id, delta)| MetricRecord::counter(id.as_str(), *delta));
        gauges.chain(counters).collect()
    }

    /// Plain-text `name=value` listing.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (id, value) in &self.gauges {
            out.push_str(&format!("{id}={value}\n"));
        }
        for (id, value) in &self.counters {
            out.push_str(&format!("{id}={value}\n"));
        }
        out
    }
}
