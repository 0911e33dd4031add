//! Packet builders shared by the unit tests

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6},
    sync::Arc,
};

use pnet::packet::{
    icmp::{self, IcmpPacket},
    icmpv6::{self, Icmpv6Packet},
    ip::IpNextHeaderProtocol,
    ipv4::{self, MutableIpv4Packet},
    ipv6::MutableIpv6Packet,
    tcp::{self, TcpPacket},
    udp::{self, UdpPacket},
};

use crate::{
    config::{Pool4Config, XlatorConfig},
    send::QueueSender,
    xlat::HeaderTranslator,
    Xlator,
};

pub const FIN: u8 = 0x01;
pub const SYN: u8 = 0x02;
pub const RST: u8 = 0x04;
pub const ACK: u8 = 0x10;

pub const ECHO_REQUEST_V4: u8 = 8;
pub const ECHO_REPLY_V4: u8 = 0;
pub const ECHO_REQUEST_V6: u8 = 128;
pub const ECHO_REPLY_V6: u8 = 129;

/// A stateful config with `pool4` shared by every protocol
pub fn config(pool4: &[&str]) -> XlatorConfig {
    let prefixes: Vec<_> = pool4.iter().map(|prefix| prefix.parse().unwrap()).collect();
    XlatorConfig {
        pool4: Pool4Config::shared(&prefixes),
        ..Default::default()
    }
}

/// A translator whose output can be inspected through the returned queue
pub fn xlator(config: XlatorConfig) -> (Xlator, Arc<QueueSender>) {
    let sender = Arc::new(QueueSender::default());
    let xlator = Xlator::new(config, Arc::new(HeaderTranslator), sender.clone()).unwrap();
    (xlator, sender)
}

fn wrap_v4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; 20 + payload.len()];
    let mut packet = MutableIpv4Packet::new(&mut buffer).unwrap();
    packet.set_version(4);
    packet.set_header_length(5);
    packet.set_total_length(u16::try_from(20 + payload.len()).unwrap());
    packet.set_ttl(64);
    packet.set_next_level_protocol(IpNextHeaderProtocol(protocol));
    packet.set_source(src);
    packet.set_destination(dst);
    packet.set_payload(payload);
    packet.set_checksum(ipv4::checksum(&packet.to_immutable()));
    buffer
}

fn wrap_v6(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; 40 + payload.len()];
    let mut packet = MutableIpv6Packet::new(&mut buffer).unwrap();
    packet.set_version(6);
    packet.set_payload_length(u16::try_from(payload.len()).unwrap());
    packet.set_next_header(IpNextHeaderProtocol(next_header));
    packet.set_hop_limit(64);
    packet.set_source(src);
    packet.set_destination(dst);
    packet.set_payload(payload);
    buffer
}

fn tcp_segment(src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
    let mut segment = vec![0u8; 20];
    segment[0..2].copy_from_slice(&src_port.to_be_bytes());
    segment[2..4].copy_from_slice(&dst_port.to_be_bytes());
    segment[12] = 5 << 4;
    segment[13] = flags;
    segment[14..16].copy_from_slice(&1024u16.to_be_bytes());
    segment
}

fn udp_datagram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut datagram = vec![0u8; 8];
    datagram[0..2].copy_from_slice(&src_port.to_be_bytes());
    datagram[2..4].copy_from_slice(&dst_port.to_be_bytes());
    datagram[4..6].copy_from_slice(&u16::try_from(8 + payload.len()).unwrap().to_be_bytes());
    datagram.extend_from_slice(payload);
    datagram
}

fn echo(icmp_type: u8, id: u16) -> Vec<u8> {
    let mut message = vec![icmp_type, 0, 0, 0, 0, 0, 0, 1];
    message[4..6].copy_from_slice(&id.to_be_bytes());
    message.extend_from_slice(b"ping");
    message
}

pub fn tcp_v4(src: &str, dst: &str, flags: u8) -> Vec<u8> {
    let (src, dst): (SocketAddrV4, SocketAddrV4) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut segment = tcp_segment(src.port(), dst.port(), flags);
    let checksum = tcp::ipv4_checksum(&TcpPacket::new(&segment).unwrap(), src.ip(), dst.ip());
    segment[16..18].copy_from_slice(&checksum.to_be_bytes());
    wrap_v4(*src.ip(), *dst.ip(), 6, &segment)
}

pub fn tcp_v6(src: &str, dst: &str, flags: u8) -> Vec<u8> {
    let (src, dst): (SocketAddrV6, SocketAddrV6) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut segment = tcp_segment(src.port(), dst.port(), flags);
    let checksum = tcp::ipv6_checksum(&TcpPacket::new(&segment).unwrap(), src.ip(), dst.ip());
    segment[16..18].copy_from_slice(&checksum.to_be_bytes());
    wrap_v6(*src.ip(), *dst.ip(), 6, &segment)
}

pub fn udp_v4(src: &str, dst: &str, payload: &[u8]) -> Vec<u8> {
    let (src, dst): (SocketAddrV4, SocketAddrV4) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut datagram = udp_datagram(src.port(), dst.port(), payload);
    let checksum = udp::ipv4_checksum(&UdpPacket::new(&datagram).unwrap(), src.ip(), dst.ip());
    datagram[6..8].copy_from_slice(&checksum.to_be_bytes());
    wrap_v4(*src.ip(), *dst.ip(), 17, &datagram)
}

pub fn udp_v6(src: &str, dst: &str, payload: &[u8]) -> Vec<u8> {
    let (src, dst): (SocketAddrV6, SocketAddrV6) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut datagram = udp_datagram(src.port(), dst.port(), payload);
    let checksum = udp::ipv6_checksum(&UdpPacket::new(&datagram).unwrap(), src.ip(), dst.ip());
    datagram[6..8].copy_from_slice(&checksum.to_be_bytes());
    wrap_v6(*src.ip(), *dst.ip(), 17, &datagram)
}

pub fn echo_v4(src: &str, dst: &str, icmp_type: u8, id: u16) -> Vec<u8> {
    let (src, dst): (Ipv4Addr, Ipv4Addr) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut message = echo(icmp_type, id);
    let checksum = icmp::checksum(&IcmpPacket::new(&message).unwrap());
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
    wrap_v4(src, dst, 1, &message)
}

pub fn echo_v6(src: &str, dst: &str, icmp_type: u8, id: u16) -> Vec<u8> {
    let (src, dst): (Ipv6Addr, Ipv6Addr) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut message = echo(icmp_type, id);
    let checksum = icmpv6::checksum(&Icmpv6Packet::new(&message).unwrap(), &src, &dst);
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
    wrap_v6(src, dst, 58, &message)
}

/// A destination unreachable message quoting `quoted`
pub fn icmp_error_v4(src: &str, dst: &str, quoted: &[u8]) -> Vec<u8> {
    let (src, dst): (Ipv4Addr, Ipv4Addr) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut message = vec![3, 1, 0, 0, 0, 0, 0, 0];
    message.extend_from_slice(quoted);
    let checksum = icmp::checksum(&IcmpPacket::new(&message).unwrap());
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
    wrap_v4(src, dst, 1, &message)
}

/// A destination unreachable message quoting `quoted`
pub fn icmp_error_v6(src: &str, dst: &str, quoted: &[u8]) -> Vec<u8> {
    let (src, dst): (Ipv6Addr, Ipv6Addr) = (src.parse().unwrap(), dst.parse().unwrap());
    let mut message = vec![1, 3, 0, 0, 0, 0, 0, 0];
    message.extend_from_slice(quoted);
    let checksum = icmpv6::checksum(&Icmpv6Packet::new(&message).unwrap(), &src, &dst);
    message[2..4].copy_from_slice(&checksum.to_be_bytes());
    wrap_v6(src, dst, 58, &message)
}
