//! Packet-in handling for one switch connection.

use crate::arp;
use crate::catalog::FlowRule;
use crate::datapath::{Command, Dpid, PortNo, PriorityPolicy};
use crate::packet::{ArpHeaders, L3Headers, MacAddr, parse_frame};
use crate::role::Role;
use crate::state::ForwardingState;
use tracing::{debug, warn};

/// Decision logic and learning state owned by a single switch connection.
///
/// Not shared between switches. Packet-ins must be fed in the order the
/// switch delivered them.
#[derive(Debug)]
pub struct SwitchHandler {
    dpid: Dpid,
    role: Role,
    priority: PriorityPolicy,
    state: ForwardingState,
}

impl SwitchHandler {
    /// `priority` is applied to the rules this handler pins on ARP replies.
    /// It must rank them below the switch's static rules.
    pub fn new(dpid: Dpid, role: Role, priority: PriorityPolicy) -> Self {
        Self {
            dpid,
            role,
            priority,
            state: ForwardingState::new(),
        }
    }

    pub fn dpid(&self) -> Dpid {
        self.dpid
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> &ForwardingState {
        &self.state
    }

    /// Process one packet-in and return the commands to issue, in order.
    ///
    /// 1. learn the source MAC on `in_port` (first writer wins)
    /// 2. replay the frame to the destination's port if it is known
    /// 3. ARP: answer requests through the proxy; on any other ARP
    ///    operation pin every learned host with a standing rule
    ///
    /// Steps 2 and 3 are independent. Frames that do not parse are dropped
    /// without touching the learning state. Firewall switches only log
    /// packet-ins.
    pub fn handle_packet_in(&mut self, in_port: PortNo, frame: &[u8]) -> Vec<Command> {
        let headers = match parse_frame(frame) {
            Ok(h) => h,
            Err(e) => {
                warn!(dpid = %self.dpid, in_port, error = %e, "Ignoring incomplete packet");
                return Vec::new();
            }
        };

        debug!(
            dpid = %self.dpid,
            in_port,
            src_mac = %headers.src_mac,
            dst_mac = %headers.dst_mac,
            ethertype = headers.ethertype,
            table = ?self.state.learned(),
            "Packet-in"
        );

        if self.role == Role::Firewall {
            debug!(dpid = %self.dpid, in_port, "Unhandled packet");
            return Vec::new();
        }

        let mut commands = Vec::new();

        if self.state.learn(headers.src_mac, in_port) {
            debug!(dpid = %self.dpid, mac = %headers.src_mac, port = in_port, "Learned host");
        }

        if let Some(out_port) = self.state.port_of(&headers.dst_mac) {
            debug!(dpid = %self.dpid, dst_mac = %headers.dst_mac, out_port, "Forwarding to known host");
            commands.push(Command::packet_out(frame.to_vec(), out_port));
        }

        if let L3Headers::Arp(arp) = headers.l3 {
            if arp.is_request() {
                commands.push(self.answer_arp_request(in_port, headers.src_mac, &arp));
            } else {
                commands.extend(self.pin_learned_hosts());
            }
        }

        commands
    }

    fn answer_arp_request(&mut self, in_port: PortNo, requester: MacAddr, arp: &ArpHeaders) -> Command {
        if self.state.observe_ip(arp.sender_ip, arp.sender_mac) {
            debug!(dpid = %self.dpid, ip = %arp.sender_ip, mac = %arp.sender_mac, "Cached ARP sender");
        }
        Command::packet_out(arp::proxy_reply(self.dpid, requester, arp), in_port)
    }

    /// One forwarding rule per learned MAC followed by a trailing flood rule.
    /// Iterates over a snapshot of the learning table.
    fn pin_learned_hosts(&self) -> Vec<Command> {
        let learned = self.state.learned();
        debug!(dpid = %self.dpid, hosts = learned.len(), "ARP reply seen, installing host rules");

        let mut rules: Vec<FlowRule> = learned
            .into_iter()
            .map(|(mac, port)| FlowRule::forward_from(mac, port))
            .collect();
        rules.push(FlowRule::flood_all());
        self.priority.assign(rules)
    }
}
