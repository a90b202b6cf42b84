//! Switch connection lifecycle and per-switch event loops.
//!
//! Each connected switch gets its own tokio task owning a
//! [`SwitchHandler`]. Packet-ins reach the task over a channel, so events
//! of one switch are handled strictly in order while different switches
//! never share mutable state.

use crate::config::ValidatedConfig;
use crate::datapath::{Command, Datapath, Dpid, PortNo};
use crate::dispatcher::SwitchHandler;
use crate::role::{Role, RoleResolver, UnknownSwitch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Depth of a switch's packet-in queue.
const PACKET_IN_QUEUE: usize = 1024;

/// Events delivered by the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ConnectionUp {
        dpid: Dpid,
    },
    PacketIn {
        dpid: Dpid,
        in_port: PortNo,
        frame: Vec<u8>,
    },
    ConnectionDown {
        dpid: Dpid,
    },
}

impl Event {
    pub fn dpid(&self) -> Dpid {
        match self {
            Event::ConnectionUp { dpid }
            | Event::PacketIn { dpid, .. }
            | Event::ConnectionDown { dpid } => *dpid,
        }
    }
}

/// Controller errors.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    UnknownSwitch(#[from] UnknownSwitch),

    #[error("Switch {0} is not connected")]
    NotConnected(Dpid),

    #[error("Handler for switch {0} has stopped")]
    HandlerStopped(Dpid),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

struct PacketIn {
    in_port: PortNo,
    frame: Vec<u8>,
}

/// A live switch connection.
struct SwitchConnection {
    role: Role,
    tx: mpsc::Sender<PacketIn>,
    task: JoinHandle<()>,
}

/// Routes protocol events to per-switch handlers.
pub struct Controller {
    resolver: RoleResolver,
    datapath: Arc<dyn Datapath>,
    switches: Mutex<HashMap<Dpid, SwitchConnection>>,
}

impl Controller {
    pub fn new(config: &ValidatedConfig, datapath: Arc<dyn Datapath>) -> Self {
        Self {
            resolver: config.resolver(),
            datapath,
            switches: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_event(&self, event: Event) -> Result<()> {
        match event {
            Event::ConnectionUp { dpid } => self.connection_up(dpid).await.map(|_| ()),
            Event::PacketIn {
                dpid,
                in_port,
                frame,
            } => self.packet_in(dpid, in_port, frame).await,
            Event::ConnectionDown { dpid } => self.connection_down(dpid).await,
        }
    }

    /// Accept a switch: resolve its role, install the role's static rules
    /// and start its handler. Unknown switches are refused without any
    /// rule being installed.
    pub async fn connection_up(&self, dpid: Dpid) -> Result<Role> {
        let (role, rules) = match self.resolver.connection_up(dpid) {
            Ok(r) => r,
            Err(e) => {
                warn!(dpid = %dpid, "Refusing connection from unknown switch");
                return Err(e.into());
            }
        };

        // Old handler drains without holding the map lock
        let previous = self.switches.lock().await.remove(&dpid);
        if let Some(old) = previous {
            info!(dpid = %dpid, "Switch reconnected, discarding previous state");
            stop(dpid, old).await;
        }

        for command in &rules {
            command.apply(dpid, self.datapath.as_ref());
        }

        let static_policy = self.resolver.priority();
        debug!(
            dpid = %dpid,
            static_floor = ?static_policy.floor(rules.len()),
            "Pinned host rules rank below static rules"
        );
        let handler = SwitchHandler::new(dpid, role, static_policy.below(rules.len()));
        let (tx, rx) = mpsc::channel(PACKET_IN_QUEUE);
        let task = tokio::spawn(run_switch(handler, rx, Arc::clone(&self.datapath)));

        let replaced = self
            .switches
            .lock()
            .await
            .insert(dpid, SwitchConnection { role, tx, task });
        if let Some(stale) = replaced {
            warn!(dpid = %dpid, "Concurrent connection-up, dropping the earlier handler");
            stop(dpid, stale).await;
        }

        Ok(role)
    }

    /// Queue a packet-in for the switch's handler.
    pub async fn packet_in(&self, dpid: Dpid, in_port: PortNo, frame: Vec<u8>) -> Result<()> {
        let tx = {
            let switches = self.switches.lock().await;
            match switches.get(&dpid) {
                Some(conn) => conn.tx.clone(),
                None => return Err(ControllerError::NotConnected(dpid)),
            }
        };
        tx.send(PacketIn { in_port, frame })
            .await
            .map_err(|_| ControllerError::HandlerStopped(dpid))
    }

    /// Drop a switch. Queued packet-ins are processed before its learning
    /// state is discarded.
    pub async fn connection_down(&self, dpid: Dpid) -> Result<()> {
        let conn = self.switches.lock().await.remove(&dpid);
        match conn {
            Some(conn) => {
                stop(dpid, conn).await;
                Ok(())
            }
            None => Err(ControllerError::NotConnected(dpid)),
        }
    }

    pub async fn role_of(&self, dpid: Dpid) -> Option<Role> {
        self.switches.lock().await.get(&dpid).map(|c| c.role)
    }

    /// Connected switches ordered by dpid.
    pub async fn connected(&self) -> Vec<Dpid> {
        let mut dpids: Vec<_> = self.switches.lock().await.keys().copied().collect();
        dpids.sort();
        dpids
    }

    /// Disconnect every switch.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.switches.lock().await.drain().collect();
        for (dpid, conn) in drained {
            stop(dpid, conn).await;
        }
        info!("Controller stopped");
    }
}

async fn stop(dpid: Dpid, conn: SwitchConnection) {
    let SwitchConnection { tx, task, .. } = conn;
    drop(tx);
    if let Err(e) = task.await {
        warn!(dpid = %dpid, error = %e, "Switch handler panicked");
    }
}

async fn run_switch(
    mut handler: SwitchHandler,
    mut rx: mpsc::Receiver<PacketIn>,
    datapath: Arc<dyn Datapath>,
) {
    let dpid = handler.dpid();
    debug!(dpid = %dpid, role = %handler.role(), "Switch handler started");

    while let Some(PacketIn { in_port, frame }) = rx.recv().await {
        let commands: Vec<Command> = handler.handle_packet_in(in_port, &frame);
        for command in &commands {
            command.apply(dpid, datapath.as_ref());
        }
    }

    info!(dpid = %dpid, learned = handler.state().len(), "Switch disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json() {
        let event: Event =
            serde_json::from_str(r#"{"event":"packet_in","dpid":3,"in_port":2,"frame":[1,2]}"#)
                .unwrap();
        assert_eq!(
            event,
            Event::PacketIn {
                dpid: Dpid(3),
                in_port: 2,
                frame: vec![1, 2]
            }
        );
        assert_eq!(event.dpid(), Dpid(3));

        let up: Event = serde_json::from_str(r#"{"event":"connection_up","dpid":21}"#).unwrap();
        assert_eq!(up, Event::ConnectionUp { dpid: Dpid(21) });
    }
}
