//! Target model
//!
//! A target is a named entity with an ordered list of addresses to probe.
//! The control plane owns targets; the engine only ever sees snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

/// Stable identifier of a target: scope (namespace) plus name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    /// Scope the target lives in (e.g. a namespace)
    pub scope: String,
    /// Name of the target within its scope
    pub name: String,
}

impl TargetKey {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// Immutable snapshot of a target as seen by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target identifier
    pub key: TargetKey,

    /// Addresses to probe, in the order the control plane listed them
    pub addresses: Vec<String>,

    /// Deletion has been requested for this target
    #[serde(default)]
    pub deleting: bool,
}

impl Target {
    /// Create a new target snapshot
    pub fn new(key: TargetKey, addresses: Vec<String>) -> Self {
        Self {
            key,
            addresses,
            deleting: false,
        }
    }

    /// Mark the snapshot as deletion-pending
    pub fn with_deleting(mut self, deleting: bool) -> Self {
        self.deleting = deleting;
        self
    }

    /// Validate the address list and return it in its original order
    pub fn parsed_addresses(&self) -> Result<Vec<String>> {
        parse_addresses(&self.addresses)
    }
}

/// Validate every address, failing the whole list on the first bad entry
pub fn parse_addresses(addresses: &[String]) -> Result<Vec<String>> {
    addresses
        .iter()
        .map(|address| validate_address(address).map(|_| address.clone()))
        .collect()
}

/// Join addresses into the comma-separated annotation form
pub fn join_addresses(addresses: &[String]) -> String {
    addresses.join(",")
}

/// Order-independent comparison of two address lists
pub fn same_address_set(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Accept an IP, a socket address, or a hostname with optional port
fn validate_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::invalid_address(address, "address cannot be empty"));
    }

    if address.parse::<IpAddr>().is_ok() || address.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }

    let host = match address.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>()
                .map_err(|_| Error::invalid_address(address, format!("invalid port '{}'", port)))?;
            host
        }
        None => address,
    };

    validate_hostname(address, host)
}

/// Basic RFC 1035 hostname validation
fn validate_hostname(address: &str, host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(Error::invalid_address(address, "host cannot be empty"));
    }

    if host.len() > 253 {
        return Err(Error::invalid_address(
            address,
            format!("host too long: {} chars (max 253)", host.len()),
        ));
    }

    for label in host.split('.') {
        if label.is_empty() {
            return Err(Error::invalid_address(address, "host has an empty label"));
        }

        if label.len() > 63 {
            return Err(Error::invalid_address(
                address,
                format!("label '{}' too long (max 63)", label),
            ));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::invalid_address(
                address,
                format!("label '{}' contains invalid characters", label),
            ));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_address(
                address,
                format!("label '{}' cannot start or end with hyphen", label),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_accepts_ips_sockets_and_hosts() {
        let input = addrs(&["10.0.0.1", "[::1]:8080", "db.internal:5432", "fe80::1", "svc"]);
        assert_eq!(parse_addresses(&input).unwrap(), input);
    }

    #[test]
    fn test_parse_rejects_whole_list_on_bad_entry() {
        let input = addrs(&["10.0.0.1", "bad host", "10.0.0.2"]);
        let err = parse_addresses(&input).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { ref address, .. } if address == "bad host"));

        assert!(parse_addresses(&addrs(&[""])).is_err());
        assert!(parse_addresses(&addrs(&["host:notaport"])).is_err());
        assert!(parse_addresses(&addrs(&["-edge.example"])).is_err());
    }

    #[test]
    fn test_join_annotation_form() {
        assert!(join_addresses(&[]).is_empty());
        assert_eq!(join_addresses(&addrs(&["1.1.1.1", "2.2.2.2"])), "1.1.1.1,2.2.2.2");
    }

    #[test]
    fn test_same_address_set_ignores_order() {
        assert!(same_address_set(&addrs(&["a", "b"]), &addrs(&["b", "a"])));
        assert!(!same_address_set(&addrs(&["a"]), &addrs(&["a", "b"])));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(TargetKey::new("default", "web").to_string(), "default/web");
    }
}
