//! Static match/action rule sets per switch role.

use crate::datapath::PortNo;
use crate::packet::{
    ETHERTYPE_ARP, ETHERTYPE_IPV4, IP_PROTO_ICMP, L3Headers, MacAddr, PacketHeaders,
};
use crate::role::Role;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Predicate over packet header fields. `None` is a wildcard.
///
/// Network-layer fields only match IPv4 packets, as in OpenFlow 1.0
/// where `nw_*` fields are ignored unless `dl_type` is IPv4.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_port: Option<PortNo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_src: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_dst: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_src: Option<Ipv4Net>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_dst: Option<Ipv4Net>,
}

impl FlowMatch {
    /// Match every packet.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a packet received on `in_port` with `headers` satisfies this match.
    pub fn matches(&self, in_port: PortNo, headers: &PacketHeaders) -> bool {
        if self.in_port.is_some_and(|p| p != in_port)
            || self.eth_src.is_some_and(|m| m != headers.src_mac)
            || self.eth_dst.is_some_and(|m| m != headers.dst_mac)
            || self.eth_type.is_some_and(|t| t != headers.ethertype)
        {
            return false;
        }

        if self.ip_proto.is_none() && self.ip_src.is_none() && self.ip_dst.is_none() {
            return true;
        }

        match headers.l3 {
            L3Headers::Ipv4 { src, dst, protocol } => {
                self.ip_proto.is_none_or(|p| p == protocol)
                    && self.ip_src.is_none_or(|net| net.contains(&src))
                    && self.ip_dst.is_none_or(|net| net.contains(&dst))
            }
            _ => false,
        }
    }
}

/// What a switch does with a matching packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Send out a single port.
    Output { port: PortNo },
    /// Send out every port except the ingress port.
    Flood,
}

/// A match plus an ordered action list. No actions means drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    #[serde(rename = "match")]
    pub matcher: FlowMatch,
    pub actions: Vec<Action>,
}

impl FlowRule {
    pub fn new(matcher: FlowMatch, actions: Vec<Action>) -> Self {
        Self { matcher, actions }
    }

    /// Flood everything not matched by a more specific rule.
    pub fn flood_all() -> Self {
        Self::new(FlowMatch::any(), vec![Action::Flood])
    }

    /// Send matching packets nowhere.
    pub fn drop(matcher: FlowMatch) -> Self {
        Self::new(matcher, Vec::new())
    }

    /// Forward everything sourced from `mac` to `port`.
    pub fn forward_from(mac: MacAddr, port: PortNo) -> Self {
        Self::new(
            FlowMatch {
                eth_src: Some(mac),
                ..FlowMatch::any()
            },
            vec![Action::Output { port }],
        )
    }

    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Host addresses the aggregation switch's isolation policy refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationPolicy {
    /// Representative address of the untrusted subnet.
    pub untrusted: Ipv4Addr,
    /// Address of the protected server.
    pub protected: Ipv4Addr,
}

fn host_net(addr: Ipv4Addr) -> Ipv4Net {
    Ipv4Net::from(addr)
}

/// The ordered static rule set for `role`.
pub fn rules_for(role: Role, policy: &IsolationPolicy) -> Vec<FlowRule> {
    match role {
        Role::Edge(_) | Role::Datacenter => vec![FlowRule::flood_all()],
        Role::Aggregation => vec![
            // ICMP from the untrusted host, to anywhere
            FlowRule::drop(FlowMatch {
                eth_type: Some(ETHERTYPE_IPV4),
                ip_proto: Some(IP_PROTO_ICMP),
                ip_src: Some(host_net(policy.untrusted)),
                ..FlowMatch::any()
            }),
            // any IPv4 from the untrusted host to the protected server
            FlowRule::drop(FlowMatch {
                eth_type: Some(ETHERTYPE_IPV4),
                ip_src: Some(host_net(policy.untrusted)),
                ip_dst: Some(host_net(policy.protected)),
                ..FlowMatch::any()
            }),
        ],
        // Overlapping matches: the IPv4 drop must stay below the ICMP flood
        Role::Firewall => vec![
            FlowRule::new(
                FlowMatch {
                    eth_type: Some(ETHERTYPE_IPV4),
                    ip_proto: Some(IP_PROTO_ICMP),
                    ..FlowMatch::any()
                },
                vec![Action::Flood],
            ),
            FlowRule::new(
                FlowMatch {
                    eth_type: Some(ETHERTYPE_ARP),
                    ..FlowMatch::any()
                },
                vec![Action::Flood],
            ),
            FlowRule::drop(FlowMatch {
                eth_type: Some(ETHERTYPE_IPV4),
                ..FlowMatch::any()
            }),
        ],
    }
}

/// First rule in `rules` that matches, the way a switch walks a table
/// whose entries are ordered most specific first.
pub fn first_match<'a>(
    rules: &'a [FlowRule],
    in_port: PortNo,
    headers: &PacketHeaders,
) -> Option<&'a FlowRule> {
    rules.iter().find(|r| r.matcher.matches(in_port, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNTRUSTED: Ipv4Addr = Ipv4Addr::new(172, 16, 10, 100);
    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 4, 10);

    fn policy() -> IsolationPolicy {
        IsolationPolicy {
            untrusted: UNTRUSTED,
            protected: SERVER,
        }
    }

    fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8) -> PacketHeaders {
        PacketHeaders {
            src_mac: MacAddr([0x52, 0x54, 0, 0, 0, 1]),
            dst_mac: MacAddr([0x52, 0x54, 0, 0, 0, 2]),
            ethertype: ETHERTYPE_IPV4,
            l3: L3Headers::Ipv4 { src, dst, protocol },
        }
    }

    #[test]
    fn test_edge_and_datacenter_flood_all() {
        for role in [Role::Edge(1), Role::Edge(2), Role::Edge(3), Role::Datacenter] {
            let rules = rules_for(role, &policy());
            assert_eq!(rules.len(), 1);
            assert!(rules[0].matcher.is_wildcard());
            assert_eq!(rules[0].actions, vec![Action::Flood]);
        }
    }

    #[test]
    fn test_aggregation_rules_are_drops() {
        let rules = rules_for(Role::Aggregation, &policy());
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(FlowRule::is_drop));
        assert_eq!(rules[0].matcher.ip_proto, Some(IP_PROTO_ICMP));
        assert_eq!(rules[1].matcher.ip_proto, None);
        assert_eq!(rules[1].matcher.ip_dst, Some(Ipv4Net::from(SERVER)));
    }

    #[test]
    fn test_icmp_from_untrusted_dropped_anywhere() {
        let rules = rules_for(Role::Aggregation, &policy());
        let pkt = ipv4(UNTRUSTED, Ipv4Addr::new(10, 0, 1, 10), IP_PROTO_ICMP);
        let hit = first_match(&rules, 1, &pkt).expect("ICMP from untrusted must match");
        assert!(hit.is_drop());
    }

    #[test]
    fn test_tcp_from_untrusted_to_server_dropped() {
        let rules = rules_for(Role::Aggregation, &policy());
        let pkt = ipv4(UNTRUSTED, SERVER, 6);
        let hit = first_match(&rules, 1, &pkt).expect("untrusted to server must match");
        assert_eq!(hit, &rules[1]);
    }

    #[test]
    fn test_tcp_from_untrusted_elsewhere_not_matched() {
        let rules = rules_for(Role::Aggregation, &policy());
        let pkt = ipv4(UNTRUSTED, Ipv4Addr::new(10, 0, 1, 10), 6);
        assert!(first_match(&rules, 1, &pkt).is_none());
    }

    #[test]
    fn test_trusted_icmp_not_matched() {
        let rules = rules_for(Role::Aggregation, &policy());
        let pkt = ipv4(Ipv4Addr::new(10, 0, 1, 10), SERVER, IP_PROTO_ICMP);
        assert!(first_match(&rules, 1, &pkt).is_none());
    }

    #[test]
    fn test_ip_fields_never_match_arp() {
        let m = FlowMatch {
            ip_src: Some(Ipv4Net::from(UNTRUSTED)),
            ..FlowMatch::any()
        };
        let arp = PacketHeaders {
            src_mac: MacAddr([0x52, 0x54, 0, 0, 0, 1]),
            dst_mac: MacAddr::BROADCAST,
            ethertype: ETHERTYPE_ARP,
            l3: L3Headers::Other,
        };
        assert!(!m.matches(1, &arp));
    }

    #[test]
    fn test_forward_from_matches_source_mac_only() {
        let mac = MacAddr([0x52, 0x54, 0, 0, 0, 1]);
        let rule = FlowRule::forward_from(mac, 3);
        assert!(rule.matcher.matches(7, &ipv4(SERVER, UNTRUSTED, 17)));
        assert_eq!(rule.actions, vec![Action::Output { port: 3 }]);

        let mut other = ipv4(SERVER, UNTRUSTED, 17);
        other.src_mac = MacAddr([0x52, 0x54, 0, 0, 0, 9]);
        assert!(!rule.matcher.matches(7, &other));
    }

    #[test]
    fn test_firewall_rule_order() {
        let rules = rules_for(Role::Firewall, &policy());
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].actions, vec![Action::Flood]);
        assert_eq!(rules[0].matcher.ip_proto, Some(IP_PROTO_ICMP));
        assert_eq!(rules[1].matcher.eth_type, Some(ETHERTYPE_ARP));
        assert!(rules[2].is_drop());
        assert_eq!(rules[2].matcher.eth_type, Some(ETHERTYPE_IPV4));
        assert_eq!(rules[2].matcher.ip_proto, None);
    }

    #[test]
    fn test_firewall_floods_icmp_drops_other_ipv4() {
        let rules = rules_for(Role::Firewall, &policy());
        let icmp = ipv4(UNTRUSTED, SERVER, IP_PROTO_ICMP);
        assert_eq!(first_match(&rules, 1, &icmp), Some(&rules[0]));

        let udp = ipv4(Ipv4Addr::new(10, 0, 1, 10), SERVER, 17);
        assert_eq!(first_match(&rules, 1, &udp), Some(&rules[2]));
    }

    #[test]
    fn test_rule_json_shape() {
        let json = serde_json::to_value(FlowRule::flood_all()).unwrap();
        assert_eq!(json["match"], serde_json::json!({}));
        assert_eq!(json["actions"][0]["type"], "flood");
    }
}
