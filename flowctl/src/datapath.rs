//! Protocol-layer capability used to program switches.
//!
//! The decision logic never talks to a switch directly. It produces
//! [`Command`]s which are handed to a [`Datapath`] implementation
//! (an OpenFlow channel, a JSON command stream, a test recorder).

use crate::catalog::FlowRule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

/// Switch port number as seen by the protocol layer.
pub type PortNo = u16;

/// Datapath identifier of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dpid(pub u64);

impl Dpid {
    /// The lower 48 bits as six big-endian octets.
    pub fn low_octets(&self) -> [u8; 6] {
        let b = self.0.to_be_bytes();
        [b[2], b[3], b[4], b[5], b[6], b[7]]
    }
}

impl From<u64> for Dpid {
    fn from(raw: u64) -> Self {
        Dpid(raw)
    }
}

/// Conventional dash-separated rendering, e.g. `00-00-00-00-00-15`.
/// A non-zero upper 16 bits is appended as `|N`.
impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.low_octets();
        write!(
            f,
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )?;
        let high = self.0 >> 48;
        if high != 0 {
            write!(f, "|{}", high)?;
        }
        Ok(())
    }
}

/// Commands the protocol layer accepts. Both are fire-and-forget.
pub trait Datapath: Send + Sync {
    /// Install a flow rule on a switch.
    fn install_rule(&self, dpid: Dpid, rule: &FlowRule, priority: Option<u16>);

    /// Emit `frame` on `port` of a switch.
    fn send_packet_out(&self, dpid: Dpid, frame: &[u8], port: PortNo);
}

/// A single decision produced by the controller logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    InstallRule {
        rule: FlowRule,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<u16>,
    },
    PacketOut {
        frame: Vec<u8>,
        port: PortNo,
    },
}

impl Command {
    pub fn packet_out(frame: Vec<u8>, port: PortNo) -> Self {
        Command::PacketOut { frame, port }
    }

    /// Hand this command to the protocol layer.
    pub fn apply(&self, dpid: Dpid, datapath: &dyn Datapath) {
        match self {
            Command::InstallRule { rule, priority } => datapath.install_rule(dpid, rule, *priority),
            Command::PacketOut { frame, port } => datapath.send_packet_out(dpid, frame, *port),
        }
    }
}

/// How rule priorities are expressed to the switch.
///
/// Some rule tables resolve overlaps by installation order only, others
/// need an explicit priority per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriorityPolicy {
    /// Leave the priority to the protocol layer's default.
    #[default]
    Unset,
    /// Every rule gets the same priority.
    Uniform { priority: u16 },
    /// The first rule of a batch gets `base`, each later one one less.
    Descending { base: u16 },
}

impl PriorityPolicy {
    /// Turn an ordered rule batch into install commands.
    pub fn assign(&self, rules: Vec<FlowRule>) -> Vec<Command> {
        rules
            .into_iter()
            .enumerate()
            .map(|(i, rule)| Command::InstallRule {
                rule,
                priority: self.priority_at(i),
            })
            .collect()
    }

    /// Policy for a later batch that must rank strictly below a batch of
    /// `count` rules assigned by `self`. Saturates at 0.
    pub fn below(&self, count: usize) -> PriorityPolicy {
        let count = u16::try_from(count).unwrap_or(u16::MAX);
        match *self {
            PriorityPolicy::Unset => PriorityPolicy::Unset,
            PriorityPolicy::Uniform { priority } => PriorityPolicy::Uniform {
                priority: priority.saturating_sub(1),
            },
            PriorityPolicy::Descending { base } => PriorityPolicy::Descending {
                base: base.saturating_sub(count),
            },
        }
    }

    /// Priority given to the last rule of a batch of `count` rules.
    pub fn floor(&self, count: usize) -> Option<u16> {
        self.priority_at(count.saturating_sub(1))
    }

    fn priority_at(&self, index: usize) -> Option<u16> {
        match *self {
            PriorityPolicy::Unset => None,
            PriorityPolicy::Uniform { priority } => Some(priority),
            PriorityPolicy::Descending { base } => {
                let step = u16::try_from(index).unwrap_or(u16::MAX);
                Some(base.saturating_sub(step))
            }
        }
    }
}

/// Writes every command as one JSON object per line.
///
/// Writes are synchronous and happen on the calling switch task under a
/// mutex. Fine for replaying traces to stdout; a live channel should hand
/// commands to its own writer instead of blocking runtime workers.
pub struct JsonLinesDatapath<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesDatapath<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, dpid: Dpid, command: serde_json::Value) {
        let record = serde_json::json!({ "dpid": dpid.0, "switch": dpid.to_string(), "command": command });
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", record).and_then(|_| out.flush()) {
            warn!(dpid = %dpid, error = %e, "Failed to write command");
        }
    }
}

impl<W: Write + Send> Datapath for JsonLinesDatapath<W> {
    fn install_rule(&self, dpid: Dpid, rule: &FlowRule, priority: Option<u16>) {
        let command = Command::InstallRule {
            rule: rule.clone(),
            priority,
        };
        match serde_json::to_value(&command) {
            Ok(value) => self.emit(dpid, value),
            Err(e) => warn!(dpid = %dpid, error = %e, "Failed to encode flow rule"),
        }
    }

    fn send_packet_out(&self, dpid: Dpid, frame: &[u8], port: PortNo) {
        let command = Command::packet_out(frame.to_vec(), port);
        match serde_json::to_value(&command) {
            Ok(value) => self.emit(dpid, value),
            Err(e) => warn!(dpid = %dpid, error = %e, "Failed to encode packet-out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FlowRule;

    #[test]
    fn test_dpid_display() {
        assert_eq!(Dpid(1).to_string(), "00-00-00-00-00-01");
        assert_eq!(Dpid(21).to_string(), "00-00-00-00-00-15");
        assert_eq!(Dpid(0x0001_0000_0000_0002).to_string(), "00-00-00-00-00-02|1");
    }

    #[test]
    fn test_priority_unset() {
        let cmds = PriorityPolicy::Unset.assign(vec![FlowRule::flood_all(), FlowRule::flood_all()]);
        assert!(cmds.iter().all(|c| matches!(c, Command::InstallRule { priority: None, .. })));
    }

    #[test]
    fn test_priority_descending_keeps_order() {
        let rules = vec![FlowRule::flood_all(), FlowRule::flood_all(), FlowRule::flood_all()];
        let cmds = PriorityPolicy::Descending { base: 100 }.assign(rules);
        let priorities: Vec<_> = cmds
            .iter()
            .map(|c| match c {
                Command::InstallRule { priority, .. } => *priority,
                _ => panic!("expected install"),
            })
            .collect();
        assert_eq!(priorities, vec![Some(100), Some(99), Some(98)]);
    }

    #[test]
    fn test_priority_descending_saturates() {
        let rules = vec![FlowRule::flood_all(), FlowRule::flood_all()];
        let cmds = PriorityPolicy::Descending { base: 0 }.assign(rules);
        assert!(matches!(cmds[1], Command::InstallRule { priority: Some(0), .. }));
    }

    #[test]
    fn test_below_ranks_under_previous_batch() {
        let statics = PriorityPolicy::Descending { base: 1000 };
        let floor = statics.floor(2);
        assert_eq!(floor, Some(999));
        let dynamic = statics.below(2);
        assert_eq!(dynamic, PriorityPolicy::Descending { base: 998 });
        assert!(dynamic.floor(1) < floor);

        let uniform = PriorityPolicy::Uniform { priority: 10 };
        assert_eq!(uniform.below(3), PriorityPolicy::Uniform { priority: 9 });
        assert_eq!(PriorityPolicy::Unset.below(3), PriorityPolicy::Unset);
    }

    #[test]
    fn test_priority_policy_json() {
        let p: PriorityPolicy = serde_json::from_str(r#"{"kind":"uniform","priority":32768}"#).unwrap();
        assert_eq!(p, PriorityPolicy::Uniform { priority: 32768 });
    }

    #[test]
    fn test_json_lines_datapath() {
        let dp = JsonLinesDatapath::new(Vec::new());
        dp.install_rule(Dpid(1), &FlowRule::flood_all(), Some(10));
        dp.send_packet_out(Dpid(1), &[1, 2, 3], 4);

        let out = String::from_utf8(dp.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["dpid"], 1);
        assert_eq!(lines[0]["command"]["command"], "install_rule");
        assert_eq!(lines[0]["command"]["priority"], 10);
        assert_eq!(lines[1]["command"]["command"], "packet_out");
        assert_eq!(lines[1]["command"]["port"], 4);
        assert_eq!(lines[1]["switch"], "00-00-00-00-00-01");
    }
}
