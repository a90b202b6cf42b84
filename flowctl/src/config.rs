//! Static controller configuration: switch roles, host addresses and the
//! isolation policy, loaded once at startup and validated before any
//! switch connection is accepted.

use crate::catalog::{IsolationPolicy, rules_for};
use crate::datapath::{Dpid, PriorityPolicy};
use crate::role::{Role, RoleResolver, RoleTable};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Switch {0} is listed more than once")]
    DuplicateSwitch(Dpid),

    #[error("Expected switch {0} has no role")]
    MissingRole(Dpid),

    #[error("Policy {field} refers to unknown host '{name}'")]
    UnknownHost { field: &'static str, name: String },

    #[error("Host '{name}' address {ip} is not within its subnet {subnet}")]
    HostOutsideSubnet {
        name: String,
        ip: Ipv4Addr,
        subnet: Ipv4Net,
    },

    #[error("Untrusted host and protected server are both {0}")]
    PolicyConflict(Ipv4Addr),

    #[error("Rule priority {priority} leaves no room below the static rules (needs at least {needed})")]
    PriorityTooLow { priority: u16, needed: u16 },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One row of the identity to role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEntry {
    pub dpid: Dpid,
    pub role: Role,
}

/// Address and subnet of a named host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Net,
}

/// Host names the aggregation switch's policy is written against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub untrusted_host: String,
    pub protected_server: String,
}

/// Controller configuration as read from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub switches: Vec<SwitchEntry>,
    /// Switches that must have a role. Empty means only the listed ones.
    #[serde(default)]
    pub expected_switches: Vec<Dpid>,
    pub hosts: BTreeMap<String, HostEntry>,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub priority: PriorityPolicy,
}

fn switch(dpid: u64, role: Role) -> SwitchEntry {
    SwitchEntry {
        dpid: Dpid(dpid),
        role,
    }
}

fn host(ip: [u8; 4], subnet: [u8; 4]) -> HostEntry {
    HostEntry {
        ip: Ipv4Addr::from(ip),
        subnet: Ipv4Net::new(Ipv4Addr::from(subnet), 24).unwrap_or_default(),
    }
}

impl Default for ControllerConfig {
    /// Three edge switches, one core and one datacenter switch.
    fn default() -> Self {
        let switches = vec![
            switch(1, Role::Edge(1)),
            switch(2, Role::Edge(2)),
            switch(3, Role::Edge(3)),
            switch(21, Role::Aggregation),
            switch(31, Role::Datacenter),
        ];
        let expected_switches = switches.iter().map(|s| s.dpid).collect();

        let hosts = BTreeMap::from([
            ("h10".to_string(), host([10, 0, 1, 10], [10, 0, 1, 0])),
            ("h20".to_string(), host([10, 0, 2, 20], [10, 0, 2, 0])),
            ("h30".to_string(), host([10, 0, 3, 30], [10, 0, 3, 0])),
            ("serv1".to_string(), host([10, 0, 4, 10], [10, 0, 4, 0])),
            ("hnotrust".to_string(), host([172, 16, 10, 100], [172, 16, 10, 0])),
        ]);

        Self {
            switches,
            expected_switches,
            hosts,
            policy: PolicyConfig {
                untrusted_host: "hnotrust".to_string(),
                protected_server: "serv1".to_string(),
            },
            priority: PriorityPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check the configuration for completeness and consistency.
    pub fn validate(&self) -> Result<ValidatedConfig> {
        let mut seen = HashSet::new();
        for entry in &self.switches {
            if !seen.insert(entry.dpid) {
                return Err(ConfigError::DuplicateSwitch(entry.dpid));
            }
        }
        if let Some(missing) = self.expected_switches.iter().find(|d| !seen.contains(*d)) {
            return Err(ConfigError::MissingRole(*missing));
        }

        for (name, entry) in &self.hosts {
            if !entry.subnet.contains(&entry.ip) {
                return Err(ConfigError::HostOutsideSubnet {
                    name: name.clone(),
                    ip: entry.ip,
                    subnet: entry.subnet,
                });
            }
        }

        let untrusted = self.host_ip("untrusted_host", &self.policy.untrusted_host)?;
        let protected = self.host_ip("protected_server", &self.policy.protected_server)?;
        if untrusted == protected {
            return Err(ConfigError::PolicyConflict(untrusted));
        }
        let policy = IsolationPolicy {
            untrusted,
            protected,
        };
        self.check_priority(&policy)?;

        Ok(ValidatedConfig {
            roles: RoleTable::new(self.switches.iter().map(|s| (s.dpid, s.role))),
            hosts: self.hosts.clone(),
            policy,
            priority: self.priority,
        })
    }

    /// Rules pinned at runtime go below every static rule, so the largest
    /// static batch must fit above priority 0.
    fn check_priority(&self, policy: &IsolationPolicy) -> Result<()> {
        let largest = self
            .switches
            .iter()
            .map(|s| rules_for(s.role, policy).len())
            .max()
            .unwrap_or(0);
        let needed = u16::try_from(largest).unwrap_or(u16::MAX);

        let (priority, needed) = match self.priority {
            PriorityPolicy::Unset => return Ok(()),
            PriorityPolicy::Uniform { priority } => (priority, 1),
            PriorityPolicy::Descending { base } => (base, needed),
        };
        if priority < needed {
            return Err(ConfigError::PriorityTooLow { priority, needed });
        }
        Ok(())
    }

    fn host_ip(&self, field: &'static str, name: &str) -> Result<Ipv4Addr> {
        self.hosts
            .get(name)
            .map(|h| h.ip)
            .ok_or_else(|| ConfigError::UnknownHost {
                field,
                name: name.to_string(),
            })
    }
}

/// Configuration that passed [`ControllerConfig::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub roles: RoleTable,
    pub hosts: BTreeMap<String, HostEntry>,
    pub policy: IsolationPolicy,
    pub priority: PriorityPolicy,
}

impl ValidatedConfig {
    /// Name of the configured host owning `ip`.
    pub fn host_name(&self, ip: Ipv4Addr) -> Option<&str> {
        self.hosts
            .iter()
            .find(|(_, h)| h.ip == ip)
            .map(|(name, _)| name.as_str())
    }

    pub fn resolver(&self) -> RoleResolver {
        RoleResolver::new(self.roles.clone(), self.policy, self.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default().validate().unwrap();
        assert_eq!(config.roles.len(), 5);
        assert_eq!(config.policy.untrusted, Ipv4Addr::new(172, 16, 10, 100));
        assert_eq!(config.policy.protected, Ipv4Addr::new(10, 0, 4, 10));
        assert_eq!(config.priority, PriorityPolicy::Unset);
        assert_eq!(
            config.hosts["h20"].subnet,
            "10.0.2.0/24".parse::<Ipv4Net>().unwrap()
        );
    }

    #[test]
    fn test_policy_hosts_named() {
        let config = ControllerConfig::default().validate().unwrap();
        assert_eq!(config.host_name(config.policy.untrusted), Some("hnotrust"));
        assert_eq!(config.host_name(config.policy.protected), Some("serv1"));
        assert_eq!(config.host_name(Ipv4Addr::new(10, 9, 9, 9)), None);
    }

    #[test]
    fn test_duplicate_switch_rejected() {
        let mut config = ControllerConfig::default();
        config.switches.push(SwitchEntry {
            dpid: Dpid(1),
            role: Role::Datacenter,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSwitch(Dpid(1)))
        ));
    }

    #[test]
    fn test_expected_switch_without_role_rejected() {
        let mut config = ControllerConfig::default();
        config.switches.retain(|s| s.dpid != Dpid(31));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRole(Dpid(31)))
        ));
    }

    #[test]
    fn test_unknown_policy_host_rejected() {
        let mut config = ControllerConfig::default();
        config.policy.protected_server = "serv9".to_string();
        match config.validate() {
            Err(ConfigError::UnknownHost { field, name }) => {
                assert_eq!(field, "protected_server");
                assert_eq!(name, "serv9");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_host_outside_subnet_rejected() {
        let mut config = ControllerConfig::default();
        config.hosts.insert(
            "h10".to_string(),
            HostEntry {
                ip: Ipv4Addr::new(10, 0, 9, 10),
                subnet: "10.0.1.0/24".parse().unwrap(),
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HostOutsideSubnet { .. })
        ));
    }

    #[test]
    fn test_policy_conflict_rejected() {
        let mut config = ControllerConfig::default();
        config.policy.protected_server = "hnotrust".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PolicyConflict(_))
        ));
    }

    #[test]
    fn test_priority_without_room_below_static_rules_rejected() {
        let mut config = ControllerConfig::default();
        config.priority = PriorityPolicy::Descending { base: 1 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PriorityTooLow {
                priority: 1,
                needed: 2
            })
        ));

        config.priority = PriorityPolicy::Uniform { priority: 0 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PriorityTooLow { .. })
        ));

        config.priority = PriorityPolicy::Descending { base: 2 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_firewall_switch_raises_priority_floor() {
        let mut config = ControllerConfig::default();
        config.switches.push(switch(5, Role::Firewall));
        config.priority = PriorityPolicy::Descending { base: 2 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PriorityTooLow { needed: 3, .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let json = r#"{
            "switches": [
                {"dpid": 7, "role": {"edge": 1}},
                {"dpid": 8, "role": "aggregation"}
            ],
            "hosts": {
                "a": {"ip": "192.168.1.5", "subnet": "192.168.1.0/24"},
                "b": {"ip": "192.168.2.5", "subnet": "192.168.2.0/24"}
            },
            "policy": {"untrusted_host": "a", "protected_server": "b"},
            "priority": {"kind": "descending", "base": 1000}
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert!(config.expected_switches.is_empty());
        let validated = config.validate().unwrap();
        assert_eq!(validated.roles.resolve(Dpid(8)), Ok(Role::Aggregation));
        assert_eq!(validated.priority, PriorityPolicy::Descending { base: 1000 });
        assert_eq!(validated.policy.untrusted, Ipv4Addr::new(192, 168, 1, 5));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ControllerConfig::load(Path::new("/nonexistent/flowctl.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_demo_topology_matches_default() {
        let demo = ControllerConfig::from_json(include_str!("../demos/topology.json")).unwrap();
        let default = ControllerConfig::default();
        assert_eq!(demo.switches, default.switches);
        assert_eq!(demo.hosts, default.hosts);
        assert_eq!(demo.priority, PriorityPolicy::Descending { base: 1000 });
        assert!(demo.validate().is_ok());
    }

    #[test]
    fn test_default_roundtrips_through_json() {
        let json = serde_json::to_string(&ControllerConfig::default()).unwrap();
        let back = ControllerConfig::from_json(&json).unwrap();
        assert_eq!(back.switches, ControllerConfig::default().switches);
        assert!(back.validate().is_ok());
    }
}
