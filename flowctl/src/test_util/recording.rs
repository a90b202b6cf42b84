//! In-memory datapath that records every command it is handed.

use crate::catalog::FlowRule;
use crate::datapath::{Datapath, Dpid, PortNo};
use std::sync::Mutex;

/// A single call made against the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatapathCall {
    InstallRule {
        dpid: Dpid,
        rule: FlowRule,
        priority: Option<u16>,
    },
    PacketOut {
        dpid: Dpid,
        frame: Vec<u8>,
        port: PortNo,
    },
}

impl DatapathCall {
    pub fn dpid(&self) -> Dpid {
        match self {
            DatapathCall::InstallRule { dpid, .. } | DatapathCall::PacketOut { dpid, .. } => *dpid,
        }
    }
}

/// Records calls in the order they were made.
#[derive(Debug, Default)]
pub struct RecordingDatapath {
    calls: Mutex<Vec<DatapathCall>>,
}

impl RecordingDatapath {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls so far.
    pub fn calls(&self) -> Vec<DatapathCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made for one switch.
    pub fn calls_for(&self, dpid: Dpid) -> Vec<DatapathCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.dpid() == dpid)
            .collect()
    }

    /// Rules installed on one switch, in order.
    pub fn rules_for(&self, dpid: Dpid) -> Vec<FlowRule> {
        self.calls_for(dpid)
            .into_iter()
            .filter_map(|c| match c {
                DatapathCall::InstallRule { rule, .. } => Some(rule),
                _ => None,
            })
            .collect()
    }

    /// Packet-outs sent on one switch as `(frame, port)`, in order.
    pub fn packet_outs_for(&self, dpid: Dpid) -> Vec<(Vec<u8>, PortNo)> {
        self.calls_for(dpid)
            .into_iter()
            .filter_map(|c| match c {
                DatapathCall::PacketOut { frame, port, .. } => Some((frame, port)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Datapath for RecordingDatapath {
    fn install_rule(&self, dpid: Dpid, rule: &FlowRule, priority: Option<u16>) {
        self.calls.lock().unwrap().push(DatapathCall::InstallRule {
            dpid,
            rule: rule.clone(),
            priority,
        });
    }

    fn send_packet_out(&self, dpid: Dpid, frame: &[u8], port: PortNo) {
        self.calls.lock().unwrap().push(DatapathCall::PacketOut {
            dpid,
            frame: frame.to_vec(),
            port,
        });
    }
}
