//! Frame builders and parsers for tests.
//!
//! Frames start with the Ethernet header, as delivered in a packet-in.

use smoltcp::phy::ChecksumCapabilities;
use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr, IpProtocol, Ipv4Address, Ipv4Packet, Ipv4Repr,
};

// ============================================================================
// Constants
// ============================================================================

/// Ethernet header size
pub const ETHERNET_HDR_SIZE: usize = 14;

/// IP header size (without options)
pub const IP_HDR_SIZE: usize = 20;

/// ARP packet size (Ethernet + IPv4)
pub const ARP_PKT_SIZE: usize = 28;

/// Broadcast MAC address
pub const BROADCAST_MAC: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff];

// ============================================================================
// ARP Packets
// ============================================================================

fn create_arp_packet(
    eth_dst: [u8; 6],
    operation: ArpOperation,
    sender_mac: [u8; 6],
    sender_ip: [u8; 4],
    target_mac: [u8; 6],
    target_ip: [u8; 4],
) -> Vec<u8> {
    let mut packet = vec![0u8; ETHERNET_HDR_SIZE + ARP_PKT_SIZE];

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(sender_mac),
        dst_addr: EthernetAddress(eth_dst),
        ethertype: EthernetProtocol::Arp,
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);

    let arp_repr = ArpRepr::EthernetIpv4 {
        operation,
        source_hardware_addr: EthernetAddress(sender_mac),
        source_protocol_addr: Ipv4Address::from(sender_ip),
        target_hardware_addr: EthernetAddress(target_mac),
        target_protocol_addr: Ipv4Address::from(target_ip),
    };
    let mut arp_packet = ArpPacket::new_unchecked(eth_frame.payload_mut());
    arp_repr.emit(&mut arp_packet);

    packet
}

/// Create a broadcast ARP request (who-has `target_ip`)
pub fn create_arp_request(sender_mac: [u8; 6], sender_ip: [u8; 4], target_ip: [u8; 4]) -> Vec<u8> {
    create_arp_packet(
        BROADCAST_MAC,
        ArpOperation::Request,
        sender_mac,
        sender_ip,
        [0; 6],
        target_ip,
    )
}

/// Create a unicast ARP reply (`sender_ip` is-at `sender_mac`)
pub fn create_arp_reply(
    sender_mac: [u8; 6],
    sender_ip: [u8; 4],
    target_mac: [u8; 6],
    target_ip: [u8; 4],
) -> Vec<u8> {
    create_arp_packet(
        target_mac,
        ArpOperation::Reply,
        sender_mac,
        sender_ip,
        target_mac,
        target_ip,
    )
}

/// Parsed ARP reply
#[derive(Debug)]
pub struct ArpReply {
    pub eth_src: [u8; 6],
    pub eth_dst: [u8; 6],
    pub sender_mac: [u8; 6],
    pub sender_ip: [u8; 4],
    pub target_mac: [u8; 6],
    pub target_ip: [u8; 4],
}

/// Parse an ARP reply packet
pub fn parse_arp_reply(packet: &[u8]) -> Option<ArpReply> {
    let eth_frame = EthernetFrame::new_checked(packet).ok()?;
    if eth_frame.ethertype() != EthernetProtocol::Arp {
        return None;
    }

    let arp_packet = ArpPacket::new_checked(eth_frame.payload()).ok()?;
    let arp_repr = ArpRepr::parse(&arp_packet).ok()?;

    match arp_repr {
        ArpRepr::EthernetIpv4 {
            operation: ArpOperation::Reply,
            source_hardware_addr,
            source_protocol_addr,
            target_hardware_addr,
            target_protocol_addr,
        } => Some(ArpReply {
            eth_src: eth_frame.src_addr().0,
            eth_dst: eth_frame.dst_addr().0,
            sender_mac: source_hardware_addr.0,
            sender_ip: source_protocol_addr.octets(),
            target_mac: target_hardware_addr.0,
            target_ip: target_protocol_addr.octets(),
        }),
        _ => None,
    }
}

// ============================================================================
// IPv4 Packets
// ============================================================================

/// Create an IPv4 packet with `payload_len` zero bytes of payload.
///
/// The payload is not a valid transport header; the controller only looks
/// at the IPv4 header.
pub fn create_ipv4_packet(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    protocol: IpProtocol,
    payload_len: usize,
) -> Vec<u8> {
    let mut packet = vec![0u8; ETHERNET_HDR_SIZE + IP_HDR_SIZE + payload_len];

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(src_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype: EthernetProtocol::Ipv4,
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);

    let ip_repr = Ipv4Repr {
        src_addr: Ipv4Address::from(src_ip),
        dst_addr: Ipv4Address::from(dst_ip),
        next_header: protocol,
        payload_len,
        hop_limit: 64,
    };
    let mut ip_packet = Ipv4Packet::new_unchecked(eth_frame.payload_mut());
    ip_repr.emit(&mut ip_packet, &ChecksumCapabilities::default());

    packet
}

/// Create an ICMP packet (zeroed ICMP body)
pub fn create_icmp_packet(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
) -> Vec<u8> {
    create_ipv4_packet(src_mac, dst_mac, src_ip, dst_ip, IpProtocol::Icmp, 8)
}

/// Create a frame with an EtherType the controller does not interpret.
pub fn create_raw_frame(src_mac: [u8; 6], dst_mac: [u8; 6]) -> Vec<u8> {
    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(src_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype: EthernetProtocol::Unknown(0x88b5),
    };
    let mut packet = vec![0u8; ETHERNET_HDR_SIZE + 46];
    eth_repr.emit(&mut EthernetFrame::new_unchecked(&mut packet[..]));
    packet
}
