//! Host descriptors.
//!
//! A [`HostDescriptor`] is everything the connection layer needs to reach one
//! remote host: where it lives, who to log in as, the password, and an optional
//! set of named command aliases. Descriptors are read from the host store and
//! treated as immutable values for the duration of an operation.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Default SSH port used when the address carries none.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection details for a single remote host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDescriptor {
    /// `host`, `host:port` or `[v6addr]:port`
    pub address: String,
    /// Login user
    pub user: String,
    /// Password used for SSH password authentication
    #[serde(rename = "password", default)]
    pub credential: String,
    /// Named command aliases (name -> command line)
    #[serde(default)]
    pub commands: HashMap<String, String>,
}

impl HostDescriptor {
    /// Create a descriptor without command aliases.
    pub fn new(
        address: impl Into<String>,
        user: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            credential: credential.into(),
            commands: HashMap::new(),
        }
    }

    /// Add a command alias.
    pub fn with_alias(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.insert(name.into(), command.into());
        self
    }

    /// Resolve `text` against the alias table.
    ///
    /// Returns the aliased command line when `text` names an alias, or
    /// `text` itself otherwise.
    pub fn resolve_command<'a>(&'a self, text: &'a str) -> Cow<'a, str> {
        match self.commands.get(text.trim()) {
            Some(command) => Cow::Borrowed(command.as_str()),
            None => Cow::Borrowed(text),
        }
    }

    /// Split the address into a hostname and port.
    pub fn target(&self) -> (String, u16) {
        split_host_port(&self.address)
    }
}

impl fmt::Debug for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDescriptor")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("credential", &"<redacted>")
            .field("commands", &self.commands)
            .finish()
    }
}

/// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
fn split_host_port(address: &str) -> (String, u16) {
    let address = address.trim();

    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SSH_PORT);
            return (host.to_string(), port);
        }
    }

    match address.rsplit_once(':') {
        // A bare IPv6 address has more than one colon and no port
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), DEFAULT_SSH_PORT),
        },
        _ => (address.to_string(), DEFAULT_SSH_PORT),
    }
}
