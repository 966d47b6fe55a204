//! Instance identity, channel naming and address resolution.
//!
//! Channel and hash names are shared with running pipelines and must match
//! them exactly:
//!
//! - status hash: `{scheme}://{hostname}/{instance_id}/status`
//! - set channel: `{scheme}://{hostname}/{instance_id}/set`
//! - broadcast channel: `{scheme}:///set`

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{KeyValueError, Result};
use crate::registry::PropertyRegistry;

/// Default hostname convention: `<hostname>-<digits>g-<instance_id>`.
pub const DEFAULT_HOSTNAME_PATTERN: &str = r"(?P<hostname>.+)-\d+g-(?P<instance_id>.+)";

/// Hosts file consulted by [`HostsFileResolver::default`].
pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";

/// The hostname and instance a store is bound to.
///
/// Equality and hashing use the `"{hostname}.{instance_id}"` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIdentity {
    hostname: String,
    instance_id: String,
}

impl StoreIdentity {
    pub fn new(hostname: impl Into<String>, instance_id: impl ToString) -> Self {
        Self {
            hostname: hostname.into(),
            instance_id: instance_id.to_string(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl fmt::Display for StoreIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.hostname, self.instance_id)
    }
}

impl PartialEq for StoreIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for StoreIdentity {}

impl Hash for StoreIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// How a schema family delivers writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Publish a set-command on the instance's set channel.
    Publish,
    /// Write fields straight into the status hash.
    HashSet,
}

/// A family of status stores sharing a naming scheme and property set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    #[default]
    Hashpipe,
    Pypeline,
    Postprocpype,
}

impl Schema {
    /// URI scheme used in channel names.
    pub fn scheme(&self) -> &'static str {
        match self {
            Schema::Hashpipe => "hashpipe",
            Schema::Pypeline => "pypeline",
            Schema::Postprocpype => "postprocpype",
        }
    }

    pub fn status_hash(&self, identity: &StoreIdentity) -> String {
        format!(
            "{}://{}/{}/status",
            self.scheme(),
            identity.hostname(),
            identity.instance_id()
        )
    }

    pub fn set_channel(&self, identity: &StoreIdentity) -> String {
        format!(
            "{}://{}/{}/set",
            self.scheme(),
            identity.hostname(),
            identity.instance_id()
        )
    }

    /// Instance-independent channel every instance of the family listens on.
    pub fn broadcast_channel(&self) -> String {
        format!("{}:///set", self.scheme())
    }

    pub fn write_mode(&self) -> WriteMode {
        match self {
            Schema::Hashpipe => WriteMode::Publish,
            Schema::Pypeline | Schema::Postprocpype => WriteMode::HashSet,
        }
    }

    /// The built-in property set of the family.
    pub fn registry(&self) -> PropertyRegistry {
        match self {
            Schema::Hashpipe => crate::standard::hashpipe_registry(),
            Schema::Pypeline | Schema::Postprocpype => crate::pypeline::pypeline_registry(),
        }
    }

    /// Recover the identity from a status hash name of this family.
    pub fn parse_status_hash(&self, name: &str) -> Option<StoreIdentity> {
        let rest = name.strip_prefix(self.scheme())?.strip_prefix("://")?;
        let rest = rest.strip_suffix("/status")?;
        let (hostname, instance_id) = rest.split_once('/')?;
        if hostname.is_empty() || instance_id.is_empty() || instance_id.contains('/') {
            return None;
        }
        Some(StoreIdentity::new(hostname, instance_id))
    }
}

/// Maps a physical hostname to a logical `(hostname, instance_id)`.
///
/// Matching is anchored at the start of the hostname. Named groups
/// `hostname` and `instance_id` are used when present, otherwise capture
/// groups 1 and 2.
#[derive(Debug, Clone)]
pub struct HostnamePattern {
    pattern: String,
    regex: Regex,
}

impl HostnamePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn identity(&self, hostname: &str) -> Result<StoreIdentity> {
        let mismatch = || KeyValueError::PatternMismatch {
            hostname: hostname.to_string(),
            pattern: self.pattern.clone(),
        };
        let captures = self.regex.captures(hostname).ok_or_else(mismatch)?;
        let host = captures.name("hostname").or_else(|| captures.get(1));
        let instance = captures.name("instance_id").or_else(|| captures.get(2));
        match (host, instance) {
            (Some(host), Some(instance)) => Ok(StoreIdentity::new(host.as_str(), instance.as_str())),
            _ => Err(mismatch()),
        }
    }
}

/// Reverse lookup of an address to a hostname.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn reverse_lookup(&self, address: &str) -> Result<String>;
}

/// Resolver backed by a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    pub fn insert(&mut self, address: impl Into<String>, hostname: impl Into<String>) {
        self.table.insert(address.into(), hostname.into());
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn reverse_lookup(&self, address: &str) -> Result<String> {
        self.table
            .get(address)
            .cloned()
            .ok_or_else(|| KeyValueError::Resolution {
                address: address.to_string(),
                reason: "not in lookup table".to_string(),
            })
    }
}

/// Resolver reading an `/etc/hosts`-format file on every lookup.
///
/// This is the default resolver and it never queries DNS. Addresses missing
/// from the file fail with [`KeyValueError::Resolution`].
#[derive(Debug, Clone)]
pub struct HostsFileResolver {
    path: PathBuf,
}

impl HostsFileResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn find(contents: &str, address: &str) -> Option<String> {
        let wanted: Option<IpAddr> = address.parse().ok();
        contents.lines().find_map(|line| {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let entry = fields.next()?;
            let hostname = fields.next()?;
            let matches = match (wanted, entry.parse::<IpAddr>()) {
                (Some(wanted), Ok(entry)) => wanted == entry,
                _ => entry == address,
            };
            matches.then(|| hostname.to_string())
        })
    }
}

impl Default for HostsFileResolver {
    fn default() -> Self {
        Self::new(DEFAULT_HOSTS_FILE)
    }
}

#[async_trait]
impl HostResolver for HostsFileResolver {
    async fn reverse_lookup(&self, address: &str) -> Result<String> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Self::find(&contents, address).ok_or_else(|| KeyValueError::Resolution {
            address: address.to_string(),
            reason: format!("no entry in {}", self.path.display()),
        })
    }
}

/// Deployment-specific addressing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    /// Regex splitting a hostname into `(hostname, instance_id)`.
    pub hostname_pattern: String,
    /// Address-to-hostname overrides, consulted before any resolver.
    pub dns: HashMap<String, String>,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            hostname_pattern: DEFAULT_HOSTNAME_PATTERN.to_string(),
            dns: HashMap::new(),
        }
    }
}

impl AddressingConfig {
    pub fn pattern(&self) -> Result<HostnamePattern> {
        HostnamePattern::new(&self.hostname_pattern)
    }

    /// Resolve `address` to a hostname, trying the `dns` table first.
    pub async fn resolve_hostname(
        &self,
        address: &str,
        resolver: &dyn HostResolver,
    ) -> Result<String> {
        if let Some(hostname) = self.dns.get(address) {
            return Ok(hostname.clone());
        }
        resolver.reverse_lookup(address).await
    }

    /// Resolve `address` all the way to a store identity.
    pub async fn resolve_identity(
        &self,
        address: &str,
        resolver: &dyn HostResolver,
    ) -> Result<StoreIdentity> {
        let pattern = self.pattern()?;
        let hostname = self.resolve_hostname(address, resolver).await?;
        let identity = pattern.identity(&hostname)?;
        debug!(address, %hostname, %identity, "resolved instance");
        Ok(identity)
    }
}
