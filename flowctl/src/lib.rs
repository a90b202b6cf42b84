//! flowctl: control-plane logic for a small OpenFlow-style network.
//!
//! # Architecture
//!
//! ```text
//! ConnectionUp --> RoleResolver --> catalog::rules_for --> Datapath::install_rule
//!
//! PacketIn --> Controller --> per-switch task --> SwitchHandler
//!                                                   |-- learn src MAC (ForwardingState)
//!                                                   |-- known dst --> packet-out
//!                                                   +-- ARP request --> arp::proxy_reply
//!                                                       ARP reply   --> per-host rules + flood
//! ```
//!
//! The protocol layer itself (connection setup, message encoding) sits
//! behind the [`Datapath`] trait and is not part of this crate.

pub mod arp;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod datapath;
pub mod dispatcher;
pub mod packet;
pub mod role;
pub mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

// Re-export commonly used types
pub use catalog::{Action, FlowMatch, FlowRule, IsolationPolicy, rules_for};
pub use config::{ConfigError, ControllerConfig, ValidatedConfig};
pub use controller::{Controller, ControllerError, Event};
pub use datapath::{Command, Datapath, Dpid, JsonLinesDatapath, PortNo, PriorityPolicy};
pub use dispatcher::SwitchHandler;
pub use packet::{MacAddr, PacketError, PacketHeaders, parse_frame};
pub use role::{Role, RoleResolver, RoleTable, UnknownSwitch};
pub use state::ForwardingState;
