//! Host record storage.
//!
//! The [`HostStore`] trait is the seam between request handling and wherever
//! host records live. [`FileHostStore`] keeps them in memory and, when given
//! a path, persists the full set as a JSON file after every mutation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::host::HostDescriptor;

/// Errors from the host store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record matched the lookup.
    #[error("host not found: {0}")]
    NotFound(String),

    /// Reading or writing the backing file failed.
    #[error("host store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be encoded or decoded.
    #[error("host store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record was rejected.
    #[error("invalid host record: {0}")]
    Invalid(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A stored host with its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Identifier, assigned from 1 upwards
    pub id: u64,
    #[serde(flatten)]
    pub host: HostDescriptor,
}

/// Storage for host records.
pub trait HostStore: Send + Sync {
    /// Add a host; returns the stored record.
    fn create(&self, host: HostDescriptor) -> StoreResult<HostRecord>;

    /// Replace the host stored under `id`.
    ///
    /// An empty credential keeps the stored one.
    fn update(&self, id: u64, host: HostDescriptor) -> StoreResult<HostRecord>;

    /// Remove the host with `address`.
    fn remove(&self, address: &str) -> StoreResult<()>;

    /// Look a host up by address.
    fn get(&self, address: &str) -> StoreResult<HostRecord>;

    /// Look a host up by id.
    fn get_by_id(&self, id: u64) -> StoreResult<HostRecord>;

    /// Hosts whose user or address contains `query` (case-insensitive), in id order.
    fn search(&self, query: &str, limit: usize, offset: usize) -> StoreResult<Vec<HostRecord>>;

    /// Number of hosts matching `query`.
    fn count(&self, query: &str) -> StoreResult<usize>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    next_id: u64,
    hosts: Vec<HostRecord>,
}

impl StoreData {
    fn matching<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a HostRecord> + 'a {
        let needle = query.to_lowercase();
        self.hosts.iter().filter(move |record| {
            needle.is_empty()
                || record.host.user.to_lowercase().contains(&needle)
                || record.host.address.to_lowercase().contains(&needle)
        })
    }
}

/// In-memory host store, optionally persisted to a JSON file.
#[derive(Debug)]
pub struct FileHostStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl FileHostStore {
    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData {
                next_id: 1,
                hosts: Vec::new(),
            }),
        }
    }

    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StoreData::default()
            } else {
                serde_json::from_str::<StoreData>(&content)?
            }
        } else {
            StoreData::default()
        };

        let max_id = data.hosts.iter().map(|r| r.id).max().unwrap_or(0);
        data.next_id = data.next_id.max(max_id + 1);

        info!(path = %path.display(), hosts = data.hosts.len(), "Opened host store");
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, data: &StoreData) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), hosts = data.hosts.len(), "Persisted host store");
        Ok(())
    }
}

fn validate(host: &HostDescriptor) -> StoreResult<()> {
    if host.address.trim().is_empty() {
        return Err(StoreError::Invalid("address must not be empty".to_string()));
    }
    if host.user.trim().is_empty() {
        return Err(StoreError::Invalid("user must not be empty".to_string()));
    }
    Ok(())
}

impl HostStore for FileHostStore {
    fn create(&self, host: HostDescriptor) -> StoreResult<HostRecord> {
        validate(&host)?;

        let mut data = self.data.write();
        if data.hosts.iter().any(|r| r.host.address == host.address) {
            return Err(StoreError::Invalid(format!(
                "host {} already exists",
                host.address
            )));
        }

        let record = HostRecord {
            id: data.next_id,
            host,
        };
        data.next_id += 1;
        data.hosts.push(record.clone());
        self.persist(&data)?;

        info!(id = record.id, address = %record.host.address, "Added host");
        Ok(record)
    }

    fn update(&self, id: u64, mut host: HostDescriptor) -> StoreResult<HostRecord> {
        validate(&host)?;

        let mut data = self.data.write();
        if data
            .hosts
            .iter()
            .any(|r| r.id != id && r.host.address == host.address)
        {
            return Err(StoreError::Invalid(format!(
                "host {} already exists",
                host.address
            )));
        }

        let record = data
            .hosts
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("id {}", id)))?;

        if host.credential.is_empty() {
            host.credential = std::mem::take(&mut record.host.credential);
        }
        record.host = host;
        let updated = record.clone();
        self.persist(&data)?;

        info!(id, address = %updated.host.address, "Updated host");
        Ok(updated)
    }

    fn remove(&self, address: &str) -> StoreResult<()> {
        let mut data = self.data.write();
        let before = data.hosts.len();
        data.hosts.retain(|r| r.host.address != address);
        if data.hosts.len() == before {
            return Err(StoreError::NotFound(address.to_string()));
        }
        self.persist(&data)?;

        info!(address, "Removed host");
        Ok(())
    }

    fn get(&self, address: &str) -> StoreResult<HostRecord> {
        self.data
            .read()
            .hosts
            .iter()
            .find(|r| r.host.address == address)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(address.to_string()))
    }

    fn get_by_id(&self, id: u64) -> StoreResult<HostRecord> {
        self.data
            .read()
            .hosts
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("id {}", id)))
    }

    fn search(&self, query: &str, limit: usize, offset: usize) -> StoreResult<Vec<HostRecord>> {
        let data = self.data.read();
        Ok(data.matching(query).skip(offset).take(limit).cloned().collect())
    }

    fn count(&self, query: &str) -> StoreResult<usize> {
        Ok(self.data.read().matching(query).count())
    }
}
