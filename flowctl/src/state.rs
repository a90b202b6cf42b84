//! Per-switch learning state.

use crate::datapath::PortNo;
use crate::packet::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// MAC learning table and ARP-observed address cache for one switch.
///
/// Learning is first-writer-wins: once a MAC is bound to a port it keeps
/// that port for the lifetime of the connection, even if the host later
/// shows up elsewhere.
#[derive(Debug, Default, Clone)]
pub struct ForwardingState {
    mac_to_port: HashMap<MacAddr, PortNo>,
    ip_to_mac: HashMap<Ipv4Addr, MacAddr>,
}

impl ForwardingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `mac` on `port` unless it is already known. Returns true if a
    /// new entry was created.
    pub fn learn(&mut self, mac: MacAddr, port: PortNo) -> bool {
        if self.mac_to_port.contains_key(&mac) {
            return false;
        }
        self.mac_to_port.insert(mac, port);
        true
    }

    pub fn port_of(&self, mac: &MacAddr) -> Option<PortNo> {
        self.mac_to_port.get(mac).copied()
    }

    /// Remember the hardware address an ARP requester announced for `ip`,
    /// unless one is already recorded.
    pub fn observe_ip(&mut self, ip: Ipv4Addr, mac: MacAddr) -> bool {
        if self.ip_to_mac.contains_key(&ip) {
            return false;
        }
        self.ip_to_mac.insert(ip, mac);
        true
    }

    pub fn mac_of(&self, ip: &Ipv4Addr) -> Option<MacAddr> {
        self.ip_to_mac.get(ip).copied()
    }

    /// Copy of the learning table, ordered by MAC.
    pub fn learned(&self) -> Vec<(MacAddr, PortNo)> {
        let mut entries: Vec<_> = self.mac_to_port.iter().map(|(m, p)| (*m, *p)).collect();
        entries.sort_unstable();
        entries
    }

    pub fn len(&self) -> usize {
        self.mac_to_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mac_to_port.is_empty()
    }

    pub fn ip_entries(&self) -> usize {
        self.ip_to_mac.len()
    }
}
