//! Header parsing for frames delivered in packet-in events.
//!
//! Only the fields the controller decides on are extracted: Ethernet
//! addresses and type, the ARP body, and the IPv4 addresses/protocol.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    Ipv4Packet,
};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// EtherType for IPv4 (OpenFlow `dl_type`).
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// EtherType for ARP.
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// IP protocol number for ICMP (OpenFlow `nw_proto`).
pub const IP_PROTO_ICMP: u8 = 1;

/// Packet parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("Truncated Ethernet frame ({0} bytes)")]
    TruncatedEthernet(usize),

    #[error("Malformed ARP payload")]
    MalformedArp,

    #[error("Malformed IPv4 header")]
    MalformedIpv4,

    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),
}

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<EthernetAddress> for MacAddr {
    fn from(addr: EthernetAddress) -> Self {
        MacAddr(addr.0)
    }
}

impl From<MacAddr> for EthernetAddress {
    fn from(mac: MacAddr) -> Self {
        EthernetAddress(mac.0)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(PacketError::InvalidMac(s.to_string()));
        }
        let mut mac = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(PacketError::InvalidMac(s.to_string()));
            }
            mac[i] =
                u8::from_str_radix(part, 16).map_err(|_| PacketError::InvalidMac(s.to_string()))?;
        }
        Ok(MacAddr(mac))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fields of an Ethernet/IPv4 ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpHeaders {
    pub operation: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpHeaders {
    pub fn is_request(&self) -> bool {
        self.operation == ArpOperation::Request
    }
}

/// Network-layer view of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3Headers {
    Arp(ArpHeaders),
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
    },
    /// Any other EtherType; only the Ethernet header is known.
    Other,
}

/// Parsed header fields of one packet-in frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeaders {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub ethertype: u16,
    pub l3: L3Headers,
}

impl PacketHeaders {
    pub fn arp(&self) -> Option<&ArpHeaders> {
        match &self.l3 {
            L3Headers::Arp(arp) => Some(arp),
            _ => None,
        }
    }

    pub fn is_arp(&self) -> bool {
        self.arp().is_some()
    }
}

/// Parse a raw Ethernet frame.
///
/// A frame is rejected when its Ethernet header is truncated, or when the
/// EtherType announces ARP or IPv4 and the body does not parse as such.
pub fn parse_frame(raw: &[u8]) -> Result<PacketHeaders, PacketError> {
    let frame =
        EthernetFrame::new_checked(raw).map_err(|_| PacketError::TruncatedEthernet(raw.len()))?;
    let ethertype = frame.ethertype();

    let l3 = match ethertype {
        EthernetProtocol::Arp => {
            let packet =
                ArpPacket::new_checked(frame.payload()).map_err(|_| PacketError::MalformedArp)?;
            match ArpRepr::parse(&packet).map_err(|_| PacketError::MalformedArp)? {
                ArpRepr::EthernetIpv4 {
                    operation,
                    source_hardware_addr,
                    source_protocol_addr,
                    target_hardware_addr,
                    target_protocol_addr,
                } => L3Headers::Arp(ArpHeaders {
                    operation,
                    sender_mac: source_hardware_addr.into(),
                    sender_ip: source_protocol_addr,
                    target_mac: target_hardware_addr.into(),
                    target_ip: target_protocol_addr,
                }),
                _ => return Err(PacketError::MalformedArp),
            }
        }
        EthernetProtocol::Ipv4 => {
            let packet =
                Ipv4Packet::new_checked(frame.payload()).map_err(|_| PacketError::MalformedIpv4)?;
            L3Headers::Ipv4 {
                src: packet.src_addr(),
                dst: packet.dst_addr(),
                protocol: packet.next_header().into(),
            }
        }
        _ => L3Headers::Other,
    };

    Ok(PacketHeaders {
        src_mac: frame.src_addr().into(),
        dst_mac: frame.dst_addr().into(),
        ethertype: ethertype.into(),
        l3,
    })
}
