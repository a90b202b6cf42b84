//! ARP proxy.
//!
//! Every ARP request reaching the controller is answered on behalf of the
//! network. The switch presents itself as the owner of the requested
//! address using a hardware address derived from its datapath id, so the
//! request is never flooded.

use crate::datapath::Dpid;
use crate::packet::{ArpHeaders, MacAddr};
use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetFrame, EthernetProtocol, EthernetRepr,
};
use std::net::Ipv4Addr;
use tracing::debug;

/// Gateway hardware address of a switch: the lower 48 bits of its dpid.
pub fn gateway_mac(dpid: Dpid) -> MacAddr {
    MacAddr(dpid.low_octets())
}

/// Build the reply to `request`, addressed to `requester_mac` (the Ethernet
/// source of the request frame).
pub fn proxy_reply(dpid: Dpid, requester_mac: MacAddr, request: &ArpHeaders) -> Vec<u8> {
    let gateway = gateway_mac(dpid);
    debug!(
        dpid = %dpid,
        requester = %request.sender_ip,
        requested = %request.target_ip,
        gateway = %gateway,
        "ARP request: answering as gateway"
    );
    build_arp_reply(gateway, requester_mac, request.target_ip, request.sender_ip)
}

/// Serialize an Ethernet II frame carrying an ARP reply from `src_mac`
/// claiming `src_ip`, addressed to `dst_mac`/`dst_ip`.
pub fn build_arp_reply(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
) -> Vec<u8> {
    let arp_reply = ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Reply,
        source_hardware_addr: src_mac.into(),
        source_protocol_addr: src_ip,
        target_hardware_addr: dst_mac.into(),
        target_protocol_addr: dst_ip,
    };

    let eth_reply = EthernetRepr {
        src_addr: src_mac.into(),
        dst_addr: dst_mac.into(),
        ethertype: EthernetProtocol::Arp,
    };

    let total_len = eth_reply.buffer_len() + arp_reply.buffer_len();
    let mut buf = vec![0u8; total_len];
    let mut eth_frame = EthernetFrame::new_unchecked(&mut buf);
    eth_reply.emit(&mut eth_frame);
    let mut arp_packet = ArpPacket::new_unchecked(eth_frame.payload_mut());
    arp_reply.emit(&mut arp_packet);

    buf
}
