//! Load config from file and environment.

use std::path::PathBuf;

use netinf_core::{Authority, Locator, WireForm};
use serde::Deserialize;
use tracing::warn;

/// Node configuration. File: ~/.config/netinf/config.toml or /etc/netinf/config.toml.
/// Env overrides: NETINF_NAMING_HOST, NETINF_NAMING_PORT, NETINF_PEER_PORT, NETINF_PUBLISH,
/// NETINF_CACHE_PATH, NETINF_CONTENT_DIR, NETINF_LOCAL_LOCATOR, NETINF_TIMEOUT_SECS,
/// NETINF_VERIFY_CONTENT.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Naming service host (default localhost).
    #[serde(default = "default_naming_host")]
    pub naming_host: String,
    /// Naming service port (default 8080).
    #[serde(default = "default_naming_port")]
    pub naming_port: u16,
    /// `http` or `netinf`.
    #[serde(default)]
    pub wire_form: WireForm,
    /// Per-call timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Publish fetched content to the naming service.
    #[serde(default)]
    pub publish: bool,
    /// Re-hash fetched bytes and reject any that do not match their name (default true).
    #[serde(default = "default_verify_content")]
    pub verify_content: bool,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    /// Peer transport TCP port (default 45679).
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
    /// This device's locator as a URI, e.g. `nimacbt://AA:BB:CC:DD:EE:FF`.
    #[serde(default)]
    pub local_locator: Option<String>,
    #[serde(default)]
    pub search_ext: String,
}

fn default_naming_host() -> String {
    "localhost".to_string()
}
fn default_naming_port() -> u16 {
    8080
}
fn default_verify_content() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_peer_port() -> u16 {
    45679
}

fn data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h).join(".local/share/netinf"),
        None => PathBuf::from("/var/lib/netinf"),
    }
}
fn default_cache_path() -> PathBuf {
    data_dir().join("catalog.db")
}
fn default_content_dir() -> PathBuf {
    data_dir().join("content")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            naming_host: default_naming_host(),
            naming_port: default_naming_port(),
            wire_form: WireForm::default(),
            timeout_secs: default_timeout_secs(),
            publish: false,
            verify_content: default_verify_content(),
            cache_path: default_cache_path(),
            content_dir: default_content_dir(),
            peer_port: default_peer_port(),
            local_locator: None,
            search_ext: String::new(),
        }
    }
}

impl Config {
    pub fn authority(&self) -> Authority {
        Authority::new(self.naming_host.clone(), self.naming_port)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    /// The configured local locator, if set and parseable.
    pub fn local_locator(&self) -> Option<Locator> {
        let uri = self.local_locator.as_deref()?;
        let parsed = Locator::parse_uri(uri);
        if parsed.is_none() {
            warn!(uri, "ignoring unparseable local_locator");
        }
        parsed
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("NETINF_NAMING_HOST") {
        c.naming_host = s;
    }
    if let Some(p) = var("NETINF_NAMING_PORT").and_then(|s| s.parse().ok()) {
        c.naming_port = p;
    }
    if let Some(p) = var("NETINF_PEER_PORT").and_then(|s| s.parse().ok()) {
        c.peer_port = p;
    }
    if let Some(s) = var("NETINF_PUBLISH") {
        c.publish = flag(&s);
    }
    if let Some(s) = var("NETINF_VERIFY_CONTENT") {
        c.verify_content = flag(&s);
    }
    if let Some(s) = var("NETINF_CACHE_PATH") {
        c.cache_path = PathBuf::from(s);
    }
    if let Some(s) = var("NETINF_CONTENT_DIR") {
        c.content_dir = PathBuf::from(s);
    }
    if let Some(s) = var("NETINF_LOCAL_LOCATOR") {
        c.local_locator = Some(s);
    }
    if let Some(t) = var("NETINF_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
        c.timeout_secs = t;
    }
}

fn flag(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/netinf/config.toml"));
    }
    out.push(PathBuf::from("/etc/netinf/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let p = config_paths().into_iter().find(|p| p.exists())?;
    let s = match std::fs::read_to_string(&p) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %p.display(), error = %e, "cannot read config, using defaults");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(path = %p.display(), error = %e, "invalid config, using defaults");
            None
        }
    }
}
