//! API request and response types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::host::HostDescriptor;
use crate::store::HostRecord;

// ============================================================================
// Execution Types
// ============================================================================

/// Request to run a command on every stored host.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Command line or alias name
    pub command: String,
}

/// Request to run a command on one stored host.
#[derive(Debug, Deserialize)]
pub struct ExecuteCommandRequest {
    /// Stored host address
    pub address: String,
    /// Command line or alias name
    pub command: String,
}

/// Output of a single-host command.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteCommandResponse {
    /// Combined stdout/stderr
    pub output: String,
}

// ============================================================================
// Host Types
// ============================================================================

/// Query parameters for the host listing.
#[derive(Debug, Default, Deserialize)]
pub struct HostListQuery {
    /// 1-based page number
    #[serde(default)]
    pub page: Option<usize>,
    /// Case-insensitive filter on user or address
    #[serde(default)]
    pub search: Option<String>,
}

/// A stored host as returned by the API. The credential is never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostView {
    /// Store identifier
    pub id: u64,
    /// Host address
    pub address: String,
    /// Login user
    pub user: String,
    /// Command aliases
    pub commands: HashMap<String, String>,
    /// Whether a credential is stored
    pub has_password: bool,
}

impl From<HostRecord> for HostView {
    fn from(record: HostRecord) -> Self {
        Self {
            id: record.id,
            has_password: !record.host.credential.is_empty(),
            address: record.host.address,
            user: record.host.user,
            commands: record.host.commands,
        }
    }
}

/// One page of hosts.
#[derive(Debug, Serialize, Deserialize)]
pub struct HostListResponse {
    /// Hosts on this page
    pub hosts: Vec<HostView>,
    /// Current page (1-based)
    pub page: usize,
    /// Number of pages for this search
    pub total_pages: usize,
    /// Number of hosts matching the search
    pub total: usize,
    /// Search term in effect
    pub search: String,
}

/// Create (id 0 or absent) or update (id > 0) a host.
#[derive(Debug, Deserialize)]
pub struct HostUpsertRequest {
    #[serde(default)]
    pub id: u64,
    pub address: String,
    pub user: String,
    /// Empty on update keeps the stored password
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub commands: HashMap<String, String>,
}

impl HostUpsertRequest {
    /// The descriptor this request describes.
    pub fn into_descriptor(self) -> (u64, HostDescriptor) {
        let mut host = HostDescriptor::new(self.address, self.user, self.password);
        host.commands = self.commands;
        (self.id, host)
    }
}

/// Remove the host with an address.
#[derive(Debug, Deserialize)]
pub struct RemoveHostRequest {
    /// Host address
    pub address: String,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome
    pub message: String,
    /// The affected host, when there is one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<HostView>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: HostView) -> Self {
        self.host = Some(host);
        self
    }
}

// ============================================================================
// Health Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Open metrics and terminal streams
    pub active_streams: usize,
}
