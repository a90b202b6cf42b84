//! Test utilities for flowctl integration tests.
//!
//! Provides frame builders and a recording datapath for exercising the
//! controller without a real switch.

pub mod packets;
pub mod recording;

pub use packets::*;
pub use recording::{DatapathCall, RecordingDatapath};

use crate::config::{ControllerConfig, ValidatedConfig};
use crate::controller::Controller;
use crate::datapath::{Dpid, PriorityPolicy};
use crate::dispatcher::SwitchHandler;
use crate::role::Role;
use std::sync::Arc;

/// Host MACs used across tests
pub const MAC_A: [u8; 6] = [0x52, 0x54, 0x00, 0x00, 0x00, 0x0a];
pub const MAC_B: [u8; 6] = [0x52, 0x54, 0x00, 0x00, 0x00, 0x0b];
pub const MAC_C: [u8; 6] = [0x52, 0x54, 0x00, 0x00, 0x00, 0x0c];

/// Host addresses from the default topology
pub const H10_IP: [u8; 4] = [10, 0, 1, 10];
pub const H20_IP: [u8; 4] = [10, 0, 2, 20];
pub const SERV1_IP: [u8; 4] = [10, 0, 4, 10];
pub const HNOTRUST_IP: [u8; 4] = [172, 16, 10, 100];

/// Default topology, validated
pub fn test_config() -> ValidatedConfig {
    ControllerConfig::default()
        .validate()
        .expect("default config must validate")
}

/// Handler for edge switch s1 with no explicit priorities
pub fn edge_handler() -> SwitchHandler {
    SwitchHandler::new(Dpid(1), Role::Edge(1), PriorityPolicy::Unset)
}

/// Controller over the default topology wired to a recording datapath
pub fn test_controller() -> (Controller, Arc<RecordingDatapath>) {
    let datapath = Arc::new(RecordingDatapath::new());
    let controller = Controller::new(&test_config(), datapath.clone());
    (controller, datapath)
}
