//! Host health metrics.
//!
//! A metrics poll runs a battery of diagnostic commands on one host and
//! parses each result into a display string, producing a
//! [`MetricsSnapshot`]. The battery is data ([`MetricSpec`]): which command
//! to run for which [`MetricKey`]; the parser is chosen by the key.

pub mod collector;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use collector::{collect_snapshot, CollectorError, MetricsCollector};

/// The fixed set of metrics a snapshot can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKey {
    /// Output of `uptime`
    Uptime,
    /// Memory usage from `free`
    Memory,
    /// Root filesystem usage from `df`
    Disk,
    /// CPU usage from `top`
    Cpu,
}

impl MetricKey {
    /// All keys in snapshot order.
    pub const ALL: [MetricKey; 4] = [
        MetricKey::Uptime,
        MetricKey::Memory,
        MetricKey::Disk,
        MetricKey::Cpu,
    ];

    /// Lowercase name used in JSON and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Uptime => "uptime",
            MetricKey::Memory => "memory",
            MetricKey::Disk => "disk",
            MetricKey::Cpu => "cpu",
        }
    }

    /// The command the original battery runs for this metric.
    pub fn default_command(&self) -> &'static str {
        match self {
            MetricKey::Uptime => "uptime",
            MetricKey::Memory => "free -m",
            MetricKey::Disk => "df -h /",
            MetricKey::Cpu => "top -bn1 | grep 'Cpu(s)'",
        }
    }

    /// Turn raw command output into this metric's display value.
    pub fn parse(&self, output: &str) -> String {
        match self {
            MetricKey::Uptime => parser::parse_uptime(output),
            MetricKey::Memory => parser::parse_memory(output),
            MetricKey::Disk => parser::parse_disk(output),
            MetricKey::Cpu => parser::parse_cpu(output),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the diagnostic battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Which metric this command feeds
    pub key: MetricKey,
    /// Command line to run on the host
    pub command: String,
}

impl MetricSpec {
    /// A spec with an explicit command.
    pub fn new(key: MetricKey, command: impl Into<String>) -> Self {
        Self {
            key,
            command: command.into(),
        }
    }

    /// The standard battery: uptime, memory, disk, cpu.
    pub fn defaults() -> Vec<MetricSpec> {
        MetricKey::ALL
            .iter()
            .map(|key| MetricSpec::new(*key, key.default_command()))
            .collect()
    }
}

/// Value of one metric within a snapshot.
///
/// On the wire both variants are plain strings; decoding always yields
/// [`MetricReading::Value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricReading {
    /// Parsed display value
    Value(String),
    /// Why the command for this metric failed
    Error(String),
}

impl MetricReading {
    /// The display text, value or error.
    pub fn text(&self) -> &str {
        match self {
            MetricReading::Value(text) | MetricReading::Error(text) => text,
        }
    }

    /// Whether the command for this metric failed.
    pub fn is_error(&self) -> bool {
        matches!(self, MetricReading::Error(_))
    }
}

/// One point-in-time set of metric values for a host.
///
/// Serializes as `{"uptime": "...", "memory": "...", "disk": "...", "cpu": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot {
    readings: BTreeMap<MetricKey, MetricReading>,
}

impl MetricsSnapshot {
    /// Record a reading, replacing any previous one for `key`.
    pub fn insert(&mut self, key: MetricKey, reading: MetricReading) {
        self.readings.insert(key, reading);
    }

    /// Reading for `key`.
    pub fn get(&self, key: MetricKey) -> Option<&MetricReading> {
        self.readings.get(&key)
    }

    /// Number of metrics present.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the snapshot holds no readings.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Iterate readings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &MetricReading)> {
        self.readings.iter()
    }

    /// JSON text of the snapshot.
    pub fn to_json(&self) -> String {
        // A map of enum keys to strings cannot fail to serialize
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
