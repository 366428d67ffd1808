//! Locators: transport-tagged hints of where bytes for an identifier currently are.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport a locator points into.
///
/// Declaration order is the preference order the dispatcher walks locators in:
/// on-device files first, then nearby peers, then the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Transport {
    FilePath,
    Bluetooth,
    Tcp,
    Http,
}

impl Transport {
    pub const ALL: [Transport; 4] = [
        Transport::FilePath,
        Transport::Bluetooth,
        Transport::Tcp,
        Transport::Http,
    ];

    /// Query-string key used by the HTTP publish form.
    pub fn key(self) -> &'static str {
        match self {
            Transport::FilePath => "filepath",
            Transport::Bluetooth => "btmac",
            Transport::Tcp => "tcp",
            Transport::Http => "http",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.key().eq_ignore_ascii_case(key))
    }

    fn uri_prefix(self) -> &'static str {
        match self {
            Transport::FilePath => "file://",
            Transport::Bluetooth => "nimacbt://",
            Transport::Tcp => "nitcp://",
            Transport::Http => "",
        }
    }
}

/// A transport tag plus an address. A hint, not an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locator {
    transport: Transport,
    value: String,
}

/// Ordered by transport preference, then by value.
pub type LocatorSet = BTreeSet<Locator>;

impl Locator {
    pub fn new(transport: Transport, value: impl Into<String>) -> Self {
        Self {
            transport,
            value: value.into(),
        }
    }

    pub fn file_path(path: impl Into<String>) -> Self {
        Self::new(Transport::FilePath, path)
    }

    pub fn bluetooth(mac: impl Into<String>) -> Self {
        Self::new(Transport::Bluetooth, mac)
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::new(Transport::Tcp, addr)
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::new(Transport::Http, url)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// URI form carried in NetInf `loc` fields.
    pub fn to_uri(&self) -> String {
        format!("{}{}", self.transport.uri_prefix(), self.value)
    }

    /// Parse a locator URI. Returns None for schemes no transport claims.
    pub fn parse_uri(uri: &str) -> Option<Self> {
        let uri = uri.trim();
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(Self::http(uri));
        }
        [Transport::FilePath, Transport::Bluetooth, Transport::Tcp]
            .into_iter()
            .find_map(|t| {
                let prefix = t.uri_prefix();
                if lower.starts_with(prefix) && uri.len() > prefix.len() {
                    Some(Self::new(t, &uri[prefix.len()..]))
                } else {
                    None
                }
            })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}
