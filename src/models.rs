//! Wire records exchanged between poll workers and the manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened metric values for one poll cycle: `<metric>_<subkey>` -> value.
pub type MetricValues = BTreeMap<String, f64>;

/// One poll result for one host.
///
/// This is the record produced by workers on the shared channel and drained
/// by the manager; its serialized form is the interchange schema consumed by
/// dashboards and test fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub server_id: String,
    #[serde(flatten)]
    pub payload: SamplePayload,
}

/// Status-tagged payload of a [`Sample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SamplePayload {
    /// Successful poll cycle: wall-clock timestamp plus flattened values.
    Data {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        metrics: MetricValues,
    },
    /// The worker established its initial connection.
    Connected,
    /// The cycle (or the worker itself) failed.
    Error { message: String },
}

impl Sample {
    pub fn data(server_id: impl Into<String>, timestamp: DateTime<Utc>, metrics: MetricValues) -> Self {
        Self {
            server_id: server_id.into(),
            payload: SamplePayload::Data { timestamp, metrics },
        }
    }

    pub fn connected(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            payload: SamplePayload::Connected,
        }
    }

    pub fn error(server_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            payload: SamplePayload::Error { message: message.into() },
        }
    }

    /// Timestamp of a `data` sample, `None` for the other statuses.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.payload {
            SamplePayload::Data { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.payload, SamplePayload::Data { .. })
    }
}
