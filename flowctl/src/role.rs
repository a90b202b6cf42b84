//! Switch identity to role resolution.

use crate::catalog::{IsolationPolicy, rules_for};
use crate::datapath::{Command, Dpid, PriorityPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Position of a switch in the topology. Fixed for the lifetime of a
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// One of the interchangeable edge switches, numbered from 1.
    Edge(u8),
    /// Core switch carrying the security policy.
    Aggregation,
    /// Switch in front of the datacenter hosts.
    Datacenter,
    /// Stand-alone firewall: floods ICMP and ARP, drops all other IPv4.
    /// Packet-ins are only logged.
    Firewall,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Edge(n) => write!(f, "edge switch s{}", n),
            Role::Aggregation => write!(f, "aggregation switch"),
            Role::Datacenter => write!(f, "datacenter switch"),
            Role::Firewall => write!(f, "firewall"),
        }
    }
}

/// A switch connected whose identity has no configured role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown switch {0}: no role configured")]
pub struct UnknownSwitch(pub Dpid);

/// Fixed identity to role table.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    roles: HashMap<Dpid, Role>,
}

impl RoleTable {
    pub fn new(entries: impl IntoIterator<Item = (Dpid, Role)>) -> Self {
        Self {
            roles: entries.into_iter().collect(),
        }
    }

    pub fn resolve(&self, dpid: Dpid) -> Result<Role, UnknownSwitch> {
        self.roles.get(&dpid).copied().ok_or(UnknownSwitch(dpid))
    }

    pub fn contains(&self, dpid: Dpid) -> bool {
        self.roles.contains_key(&dpid)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Entries ordered by dpid.
    pub fn entries(&self) -> Vec<(Dpid, Role)> {
        let mut entries: Vec<_> = self.roles.iter().map(|(d, r)| (*d, *r)).collect();
        entries.sort_by_key(|(d, _)| *d);
        entries
    }
}

/// Resolves a connecting switch to its role and the static rules that
/// role installs.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    table: RoleTable,
    policy: IsolationPolicy,
    priority: PriorityPolicy,
}

impl RoleResolver {
    pub fn new(table: RoleTable, policy: IsolationPolicy, priority: PriorityPolicy) -> Self {
        Self {
            table,
            policy,
            priority,
        }
    }

    pub fn table(&self) -> &RoleTable {
        &self.table
    }

    pub fn priority(&self) -> PriorityPolicy {
        self.priority
    }

    /// Resolve `dpid` and return its role with the install commands for the
    /// role's rule set, in catalog order. Nothing is returned for unknown
    /// switches.
    pub fn connection_up(&self, dpid: Dpid) -> Result<(Role, Vec<Command>), UnknownSwitch> {
        let role = self.table.resolve(dpid)?;
        let rules = rules_for(role, &self.policy);
        info!(dpid = %dpid, role = %role, rules = rules.len(), "Controlling switch");
        for rule in &rules {
            debug!(dpid = %dpid, ?rule, "Static rule");
        }
        Ok((role, self.priority.assign(rules)))
    }
}
