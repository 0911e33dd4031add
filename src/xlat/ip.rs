//! Network layer headers for translated packets

use std::net::{Ipv4Addr, Ipv6Addr};

use bib::L4Proto;
use pnet::packet::{
    ip::IpNextHeaderProtocols,
    ipv4::{self, Ipv4Packet, MutableIpv4Packet},
    ipv6::{Ipv6Packet, MutableIpv6Packet},
};

use crate::packet::PacketError;

fn too_short(expected: usize, actual: usize) -> PacketError {
    PacketError::TooShort { expected, actual }
}

/// Wraps `payload` in a fresh IPv4 header
#[profiling::function]
pub(super) fn build_ipv4(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    l4: L4Proto,
    ttl: u8,
    payload: &[u8],
) -> Result<Vec<u8>, PacketError> {
    let total_len = Ipv4Packet::minimum_packet_size() + payload.len();
    let total_len_field = u16::try_from(total_len).map_err(|_| PacketError::TooLarge(total_len))?;

    let mut buffer = vec![0u8; total_len];
    let mut ipv4_packet =
        MutableIpv4Packet::new(&mut buffer).ok_or(too_short(Ipv4Packet::minimum_packet_size(), 0))?;
    ipv4_packet.set_version(4);
    ipv4_packet.set_header_length(5);
    ipv4_packet.set_total_length(total_len_field);
    ipv4_packet.set_ttl(ttl);
    ipv4_packet.set_next_level_protocol(match l4 {
        L4Proto::Tcp => IpNextHeaderProtocols::Tcp,
        L4Proto::Udp => IpNextHeaderProtocols::Udp,
        L4Proto::Icmp => IpNextHeaderProtocols::Icmp,
    });
    ipv4_packet.set_source(src);
    ipv4_packet.set_destination(dst);
    ipv4_packet.set_payload(payload);
    ipv4_packet.set_checksum(ipv4::checksum(&ipv4_packet.to_immutable()));

    Ok(buffer)
}

/// Wraps `payload` in a fresh IPv6 header
#[profiling::function]
pub(super) fn build_ipv6(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    l4: L4Proto,
    hop_limit: u8,
    payload: &[u8],
) -> Result<Vec<u8>, PacketError> {
    let payload_len =
        u16::try_from(payload.len()).map_err(|_| PacketError::TooLarge(payload.len()))?;

    let mut buffer = vec![0u8; Ipv6Packet::minimum_packet_size() + payload.len()];
    let mut ipv6_packet =
        MutableIpv6Packet::new(&mut buffer).ok_or(too_short(Ipv6Packet::minimum_packet_size(), 0))?;
    ipv6_packet.set_version(6);
    ipv6_packet.set_payload_length(payload_len);
    ipv6_packet.set_next_header(match l4 {
        L4Proto::Tcp => IpNextHeaderProtocols::Tcp,
        L4Proto::Udp => IpNextHeaderProtocols::Udp,
        L4Proto::Icmp => IpNextHeaderProtocols::Icmpv6,
    });
    ipv6_packet.set_hop_limit(hop_limit);
    ipv6_packet.set_source(src);
    ipv6_packet.set_destination(dst);
    ipv6_packet.set_payload(payload);

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_header() {
        let bytes = build_ipv4(
            "192.0.2.1".parse().unwrap(),
            "198.51.100.1".parse().unwrap(),
            L4Proto::Udp,
            63,
            &[0u8; 8],
        )
        .unwrap();
        let packet = Ipv4Packet::new(&bytes).unwrap();
        assert_eq!(packet.get_total_length(), 28);
        assert_eq!(packet.get_ttl(), 63);
        assert_eq!(packet.get_next_level_protocol(), IpNextHeaderProtocols::Udp);
        assert_eq!(packet.get_checksum(), ipv4::checksum(&packet));
    }

    #[test]
    fn test_oversized_payload() {
        let payload = vec![0u8; 65_530];
        assert_eq!(
            build_ipv4(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, L4Proto::Udp, 1, &payload),
            Err(PacketError::TooLarge(65_550))
        );
        assert!(build_ipv6(
            Ipv6Addr::UNSPECIFIED,
            Ipv6Addr::UNSPECIFIED,
            L4Proto::Udp,
            1,
            &payload
        )
        .is_ok());
    }
}
