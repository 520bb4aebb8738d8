//! Lease descriptor — the static shape of a compute lease.
//!
//! Consumed once at lease-creation time. Any change to a descriptor means
//! a new lease (destroy and recreate), never in-place mutation.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ProvisioningError, ProvisioningResult};

/// Ubuntu 20.04 amd64 stable image, resolved through the parameter store.
pub const REFERENCE_IMAGE: &str =
    "/aws/service/canonical/ubuntu/server/20.04/stable/current/amd64/hvm/ebs-gp2/ami-id";

/// Smallest machine class with 16 GiB of memory that fits the workload.
pub const REFERENCE_MACHINE_CLASS: &str = "m5a.xlarge";

pub const GAME_PORT: u16 = 7777;
pub const BEACON_PORT: u16 = 15000;
pub const QUERY_PORT: u16 = 15777;

static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").expect("static regex"));

static CIDR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})/(\d{1,2})$").expect("static regex")
});

static STORAGE_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z0-9+.-]*)://([A-Za-z0-9][A-Za-z0-9.\-_]*)(/\S*)?$")
        .expect("static regex")
});

/// Transport protocol of an ingress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// A single ingress rule: `(protocol, port, source-range)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkRule {
    pub protocol: Protocol,
    pub port: u16,
    /// IPv4 CIDR the traffic may originate from.
    pub source: String,
    #[serde(default)]
    pub description: String,
}

impl NetworkRule {
    pub fn udp_from_anywhere(port: u16, description: &str) -> Self {
        Self {
            protocol: Protocol::Udp,
            port,
            source: "0.0.0.0/0".to_string(),
            description: description.to_string(),
        }
    }
}

/// Machine size, image, and root volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineProfile {
    pub class: String,
    pub image_ref: String,
    /// Root volume size in GiB.
    pub disk_size: u32,
    #[serde(default = "default_true")]
    pub delete_on_termination: bool,
}

/// The immutable description of a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseDescriptor {
    /// Prefix used to derive unique resource names.
    #[serde(default = "default_prefix")]
    pub identity_prefix: String,
    /// Name of the hosted workload, used in derived names.
    #[serde(default = "default_workload")]
    pub workload: String,
    /// Durable-storage URI, e.g. `s3://satisfactory-bucket/`.
    pub durable_storage_target: String,
    /// Opaque reference to the read/write identity grant.
    #[serde(default = "default_credential_binding")]
    pub credential_binding: String,
    pub machine_profile: MachineProfile,
    pub network_rules: Vec<NetworkRule>,
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "game".to_string()
}

fn default_workload() -> String {
    "satisfactory".to_string()
}

fn default_credential_binding() -> String {
    "bucket-read-write".to_string()
}

impl LeaseDescriptor {
    /// The reference deployment: one dedicated game server with its save
    /// bucket, reachable on the game, beacon, and query UDP ports.
    pub fn reference(bucket: &str) -> Self {
        Self {
            identity_prefix: default_prefix(),
            workload: default_workload(),
            durable_storage_target: format!("s3://{bucket}/"),
            credential_binding: default_credential_binding(),
            machine_profile: MachineProfile {
                class: REFERENCE_MACHINE_CLASS.to_string(),
                image_ref: REFERENCE_IMAGE.to_string(),
                disk_size: 18,
                delete_on_termination: true,
            },
            network_rules: vec![
                NetworkRule::udp_from_anywhere(GAME_PORT, "Game port"),
                NetworkRule::udp_from_anywhere(BEACON_PORT, "Beacon port"),
                NetworkRule::udp_from_anywhere(QUERY_PORT, "Query port"),
            ],
        }
    }

    /// Load and validate a descriptor from a TOML file.
    pub fn from_file(path: &Path) -> ProvisioningResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProvisioningError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a descriptor from TOML text.
    pub fn from_toml_str(content: &str) -> ProvisioningResult<Self> {
        let descriptor: LeaseDescriptor =
            toml::from_str(content).map_err(|e| ProvisioningError::Parse {
                what: "lease descriptor".to_string(),
                reason: e.to_string(),
            })?;
        descriptor.validate()?;
        debug!(
            lease = %descriptor.security_group_name(),
            target = %descriptor.durable_storage_target,
            rules = descriptor.network_rules.len(),
            "lease descriptor loaded"
        );
        Ok(descriptor)
    }

    pub fn to_toml_string(&self) -> ProvisioningResult<String> {
        toml::to_string_pretty(self).map_err(|e| ProvisioningError::Parse {
            what: "lease descriptor".to_string(),
            reason: e.to_string(),
        })
    }

    /// Check every field; the first problem found is returned.
    pub fn validate(&self) -> ProvisioningResult<()> {
        let invalid = |msg: String| Err(ProvisioningError::Invalid(msg));

        if !PREFIX_RE.is_match(&self.identity_prefix) {
            return invalid(format!(
                "identity prefix '{}' must be alphanumeric with dashes",
                self.identity_prefix
            ));
        }
        if !PREFIX_RE.is_match(&self.workload) {
            return invalid(format!(
                "workload name '{}' must be alphanumeric with dashes",
                self.workload
            ));
        }
        if !STORAGE_URI_RE.is_match(&self.durable_storage_target) {
            return invalid(format!(
                "durable storage target '{}' is not a scheme://bucket URI",
                self.durable_storage_target
            ));
        }
        if self.credential_binding.trim().is_empty() {
            return invalid("credential binding is empty".to_string());
        }

        let machine = &self.machine_profile;
        if machine.class.trim().is_empty() {
            return invalid("machine class is empty".to_string());
        }
        if machine.image_ref.trim().is_empty() {
            return invalid("machine image reference is empty".to_string());
        }
        if machine.disk_size == 0 {
            return invalid("disk size must be at least 1 GiB".to_string());
        }

        let mut seen = HashSet::new();
        for rule in &self.network_rules {
            if rule.port == 0 {
                return invalid(format!("{} rule has port 0", rule.protocol));
            }
            if !is_valid_cidr(&rule.source) {
                return invalid(format!(
                    "{}/{} source '{}' is not an IPv4 CIDR",
                    rule.protocol, rule.port, rule.source
                ));
            }
            if !seen.insert((rule.protocol, rule.port, rule.source.as_str())) {
                return invalid(format!(
                    "duplicate rule {}/{} from {}",
                    rule.protocol, rule.port, rule.source
                ));
            }
        }

        Ok(())
    }

    /// Bucket (authority) part of the durable-storage target.
    pub fn bucket(&self) -> Option<&str> {
        STORAGE_URI_RE
            .captures(&self.durable_storage_target)
            .and_then(|c| c.get(2))
            .map(|m| m.as_str())
    }

    /// Name of the security group guarding the instance.
    pub fn security_group_name(&self) -> String {
        format!("{}-{}", self.identity_prefix, self.workload)
    }

    /// Derive a resource name scoped to this lease.
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.identity_prefix, self.workload, suffix)
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    ///
    /// Network rules form a set, so they are sorted first; reordering rules
    /// does not change the fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut canonical = self.clone();
        canonical.network_rules.sort();
        // Serialising plain strings and integers cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Compare against the fingerprint recorded when the instance was created.
    pub fn check_drift(&self, created: &str) -> ProvisioningResult<()> {
        let current = self.fingerprint();
        if current == created {
            Ok(())
        } else {
            Err(ProvisioningError::Drift {
                created: created.to_string(),
                current,
            })
        }
    }
}

fn is_valid_cidr(source: &str) -> bool {
    let Some(caps) = CIDR_RE.captures(source) else {
        return false;
    };
    let octets_ok = (1..=4).all(|i| caps[i].parse::<u8>().is_ok());
    let mask_ok = caps[5].parse::<u8>().map(|m| m <= 32).unwrap_or(false);
    octets_ok && mask_ok
}
