//! Just enough packet parsing to know which flow a packet belongs to

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use bib::{L3Proto, L4Proto, Tuple};
use pnet::packet::{
    icmp::IcmpPacket,
    icmpv6::Icmpv6Packet,
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
};

/// Fixed size of an IPv6 header
const IPV6_HEADER_LEN: usize = 40;

/// ICMP header plus the identifier and sequence number of echo messages
const ICMP_HEADER_LEN: usize = 8;

/// Bytes of the offending packet's transport header carried by an ICMP error
const QUOTED_TRANSPORT_LEN: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum PacketError {
    #[error("Packet too short. Expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Unsupported IP version: {0}")]
    UnsupportedVersion(u8),
    #[error("Unsupported transport protocol: {0}")]
    UnsupportedProtocol(u8),
    #[error("Unsupported ICMP type: {0}")]
    UnsupportedIcmpType(u8),
    #[error("Unsupported ICMPv6 type: {0}")]
    UnsupportedIcmpv6Type(u8),
    #[error("Packet too large. {0} bytes do not fit in a single packet")]
    TooLarge(usize),
}

impl PacketError {
    /// Whether the packet is well-formed but simply not something this translator handles
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVersion(_)
                | Self::UnsupportedProtocol(_)
                | Self::UnsupportedIcmpType(_)
                | Self::UnsupportedIcmpv6Type(_)
        )
    }
}

/// The ICMP messages the translator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoRequest,
    EchoReply,
    /// An error quoting some other packet. Its tuple is the quoted packet's, reversed
    Error,
}

impl IcmpKind {
    fn from_icmp_type(icmp_type: u8) -> Result<Self, PacketError> {
        match icmp_type {
            8 => Ok(Self::EchoRequest),
            0 => Ok(Self::EchoReply),
            3 | 11 | 12 => Ok(Self::Error),
            other => Err(PacketError::UnsupportedIcmpType(other)),
        }
    }

    fn from_icmpv6_type(icmpv6_type: u8) -> Result<Self, PacketError> {
        match icmpv6_type {
            128 => Ok(Self::EchoRequest),
            129 => Ok(Self::EchoReply),
            1..=4 => Ok(Self::Error),
            other => Err(PacketError::UnsupportedIcmpv6Type(other)),
        }
    }
}

/// The TCP flags the session state machine cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    fn from_byte(flags: u8) -> Self {
        Self {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
        }
    }
}

/// A parsed IPv4 or IPv6 packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
    tuple: Tuple,
    /// Transport protocol of the packet itself (ICMP for ICMP errors, unlike the tuple)
    l4: L4Proto,
    header_len: usize,
    payload_len: usize,
    icmp: Option<IcmpKind>,
    tcp_flags: TcpFlags,
}

impl Packet {
    /// Parse a raw IPv4 or IPv6 packet
    #[profiling::function]
    pub fn parse(bytes: Vec<u8>) -> Result<Self, PacketError> {
        let version = bytes.first().map(|byte| byte >> 4);
        match version {
            Some(4) => Self::parse_ipv4(bytes),
            Some(6) => Self::parse_ipv6(bytes),
            Some(other) => Err(PacketError::UnsupportedVersion(other)),
            None => Err(PacketError::TooShort {
                expected: 1,
                actual: 0,
            }),
        }
    }

    fn parse_ipv4(bytes: Vec<u8>) -> Result<Self, PacketError> {
        let (header_len, payload_len) = ipv4_bounds(&bytes)?;
        let header = Ipv4Packet::new(&bytes).ok_or(PacketError::TooShort {
            expected: Ipv4Packet::minimum_packet_size(),
            actual: bytes.len(),
        })?;
        let protocol = header.get_next_level_protocol().0;
        let l4 = L4Proto::from_ipv4_protocol(protocol)
            .ok_or(PacketError::UnsupportedProtocol(protocol))?;
        let (src, dst) = (header.get_source(), header.get_destination());
        let payload = &bytes[header_len..header_len + payload_len];

        let mut icmp = None;
        let mut tcp_flags = TcpFlags::default();
        let tuple = match l4 {
            L4Proto::Icmp => {
                let kind = IcmpKind::from_icmp_type(icmp_type(payload)?)?;
                icmp = Some(kind);
                match kind {
                    IcmpKind::Error => quoted_ipv4_tuple(&payload[ICMP_HEADER_LEN..])?.reversed(),
                    _ => {
                        let id = icmp_id(payload)?;
                        Tuple::v4(SocketAddrV4::new(src, id), SocketAddrV4::new(dst, id), l4)
                    }
                }
            }
            _ => {
                let (src_port, dst_port) = transport_ports(l4, payload)?;
                if l4 == L4Proto::Tcp {
                    tcp_flags = tcp_flags_of(payload)?;
                }
                Tuple::v4(
                    SocketAddrV4::new(src, src_port),
                    SocketAddrV4::new(dst, dst_port),
                    l4,
                )
            }
        };

        Ok(Self {
            bytes,
            tuple,
            l4,
            header_len,
            payload_len,
            icmp,
            tcp_flags,
        })
    }

    fn parse_ipv6(bytes: Vec<u8>) -> Result<Self, PacketError> {
        let payload_len = ipv6_bounds(&bytes)?;
        let header = Ipv6Packet::new(&bytes).ok_or(PacketError::TooShort {
            expected: Ipv6Packet::minimum_packet_size(),
            actual: bytes.len(),
        })?;
        // Extension headers are not supported and show up as unknown protocols here
        let next_header = header.get_next_header().0;
        let l4 = L4Proto::from_ipv6_next_header(next_header)
            .ok_or(PacketError::UnsupportedProtocol(next_header))?;
        let (src, dst) = (header.get_source(), header.get_destination());
        let payload = &bytes[IPV6_HEADER_LEN..IPV6_HEADER_LEN + payload_len];

        let mut icmp = None;
        let mut tcp_flags = TcpFlags::default();
        let tuple = match l4 {
            L4Proto::Icmp => {
                let kind = IcmpKind::from_icmpv6_type(icmpv6_type(payload)?)?;
                icmp = Some(kind);
                match kind {
                    IcmpKind::Error => quoted_ipv6_tuple(&payload[ICMP_HEADER_LEN..])?.reversed(),
                    _ => {
                        let id = icmp_id(payload)?;
                        Tuple::v6(v6_endpoint(src, id), v6_endpoint(dst, id), l4)
                    }
                }
            }
            _ => {
                let (src_port, dst_port) = transport_ports(l4, payload)?;
                if l4 == L4Proto::Tcp {
                    tcp_flags = tcp_flags_of(payload)?;
                }
                Tuple::v6(v6_endpoint(src, src_port), v6_endpoint(dst, dst_port), l4)
            }
        };

        Ok(Self {
            bytes,
            tuple,
            l4,
            header_len: IPV6_HEADER_LEN,
            payload_len,
            icmp,
            tcp_flags,
        })
    }

    /// The raw packet
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The flow this packet belongs to
    #[must_use]
    pub fn tuple(&self) -> Tuple {
        self.tuple
    }

    #[must_use]
    pub fn l3_proto(&self) -> L3Proto {
        self.tuple.l3_proto()
    }

    /// Transport protocol of the packet itself
    #[must_use]
    pub fn l4_proto(&self) -> L4Proto {
        self.l4
    }

    #[must_use]
    pub fn icmp_kind(&self) -> Option<IcmpKind> {
        self.icmp
    }

    #[must_use]
    pub fn is_icmp_error(&self) -> bool {
        self.icmp == Some(IcmpKind::Error)
    }

    #[must_use]
    pub fn tcp_flags(&self) -> TcpFlags {
        self.tcp_flags
    }

    /// Everything after the network layer header
    #[must_use]
    pub fn l3_payload(&self) -> &[u8] {
        &self.bytes[self.header_len..self.header_len + self.payload_len]
    }

    /// IPv4 TTL or IPv6 hop limit
    #[must_use]
    pub fn hop_limit(&self) -> u8 {
        match self.l3_proto() {
            L3Proto::Ipv4 => self.bytes[8],
            L3Proto::Ipv6 => self.bytes[7],
        }
    }
}

fn need(bytes: &[u8], expected: usize) -> Result<(), PacketError> {
    if bytes.len() < expected {
        return Err(PacketError::TooShort {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Header and payload lengths of an IPv4 packet, checked against the buffer
fn ipv4_bounds(bytes: &[u8]) -> Result<(usize, usize), PacketError> {
    need(bytes, Ipv4Packet::minimum_packet_size())?;
    let header_len = usize::from(bytes[0] & 0x0f) * 4;
    let total_len = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
    need(bytes, header_len.max(total_len))?;
    if header_len < Ipv4Packet::minimum_packet_size() || total_len < header_len {
        return Err(PacketError::TooShort {
            expected: Ipv4Packet::minimum_packet_size(),
            actual: header_len.min(total_len),
        });
    }
    Ok((header_len, total_len - header_len))
}

/// Payload length of an IPv6 packet, checked against the buffer
fn ipv6_bounds(bytes: &[u8]) -> Result<usize, PacketError> {
    need(bytes, IPV6_HEADER_LEN)?;
    let payload_len = usize::from(u16::from_be_bytes([bytes[4], bytes[5]]));
    need(bytes, IPV6_HEADER_LEN + payload_len)?;
    Ok(payload_len)
}

fn v6_endpoint(addr: Ipv6Addr, port: u16) -> SocketAddrV6 {
    SocketAddrV6::new(addr, port, 0, 0)
}

fn icmp_type(payload: &[u8]) -> Result<u8, PacketError> {
    let icmp = IcmpPacket::new(payload).ok_or(PacketError::TooShort {
        expected: IcmpPacket::minimum_packet_size(),
        actual: payload.len(),
    })?;
    need(payload, ICMP_HEADER_LEN)?;
    Ok(icmp.get_icmp_type().0)
}

fn icmpv6_type(payload: &[u8]) -> Result<u8, PacketError> {
    let icmpv6 = Icmpv6Packet::new(payload).ok_or(PacketError::TooShort {
        expected: Icmpv6Packet::minimum_packet_size(),
        actual: payload.len(),
    })?;
    need(payload, ICMP_HEADER_LEN)?;
    Ok(icmpv6.get_icmpv6_type().0)
}

/// Identifier of an echo message. Same layout for ICMP and ICMPv6
fn icmp_id(payload: &[u8]) -> Result<u16, PacketError> {
    need(payload, ICMP_HEADER_LEN)?;
    Ok(u16::from_be_bytes([payload[4], payload[5]]))
}

fn transport_ports(l4: L4Proto, payload: &[u8]) -> Result<(u16, u16), PacketError> {
    match l4 {
        L4Proto::Tcp => {
            let tcp = TcpPacket::new(payload).ok_or(PacketError::TooShort {
                expected: TcpPacket::minimum_packet_size(),
                actual: payload.len(),
            })?;
            Ok((tcp.get_source(), tcp.get_destination()))
        }
        L4Proto::Udp => {
            let udp = UdpPacket::new(payload).ok_or(PacketError::TooShort {
                expected: UdpPacket::minimum_packet_size(),
                actual: payload.len(),
            })?;
            Ok((udp.get_source(), udp.get_destination()))
        }
        L4Proto::Icmp => icmp_id(payload).map(|id| (id, id)),
    }
}

fn tcp_flags_of(payload: &[u8]) -> Result<TcpFlags, PacketError> {
    need(payload, TcpPacket::minimum_packet_size())?;
    Ok(TcpFlags::from_byte(payload[13]))
}

/// Ports of a packet quoted by an ICMP error. Only the first 8 transport bytes are guaranteed
fn quoted_ports(l4: L4Proto, transport: &[u8]) -> Result<(u16, u16), PacketError> {
    need(transport, QUOTED_TRANSPORT_LEN)?;
    match l4 {
        L4Proto::Tcp | L4Proto::Udp => Ok((
            u16::from_be_bytes([transport[0], transport[1]]),
            u16::from_be_bytes([transport[2], transport[3]]),
        )),
        L4Proto::Icmp => icmp_id(transport).map(|id| (id, id)),
    }
}

/// The tuple of the IPv4 packet an ICMP error is complaining about
fn quoted_ipv4_tuple(quoted: &[u8]) -> Result<Tuple, PacketError> {
    need(quoted, Ipv4Packet::minimum_packet_size())?;
    let header_len = usize::from(quoted[0] & 0x0f) * 4;
    need(quoted, header_len.max(Ipv4Packet::minimum_packet_size()))?;
    let protocol = quoted[9];
    let l4 =
        L4Proto::from_ipv4_protocol(protocol).ok_or(PacketError::UnsupportedProtocol(protocol))?;
    let src = Ipv4Addr::new(quoted[12], quoted[13], quoted[14], quoted[15]);
    let dst = Ipv4Addr::new(quoted[16], quoted[17], quoted[18], quoted[19]);
    let (src_port, dst_port) = quoted_ports(l4, &quoted[header_len..])?;
    Ok(Tuple::v4(
        SocketAddrV4::new(src, src_port),
        SocketAddrV4::new(dst, dst_port),
        l4,
    ))
}

/// The tuple of the IPv6 packet an ICMPv6 error is complaining about
fn quoted_ipv6_tuple(quoted: &[u8]) -> Result<Tuple, PacketError> {
    let header = Ipv6Packet::new(quoted).ok_or(PacketError::TooShort {
        expected: IPV6_HEADER_LEN,
        actual: quoted.len(),
    })?;
    let next_header = header.get_next_header().0;
    let l4 = L4Proto::from_ipv6_next_header(next_header)
        .ok_or(PacketError::UnsupportedProtocol(next_header))?;
    let (src_port, dst_port) = quoted_ports(l4, &quoted[IPV6_HEADER_LEN..])?;
    Ok(Tuple::v6(
        v6_endpoint(header.get_source(), src_port),
        v6_endpoint(header.get_destination(), dst_port),
        l4,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_parse_ipv6_tcp() {
        let packet = Packet::parse(testing::tcp_v6(
            "[2001:db8::1]:1234",
            "[64:ff9b::c633:6401]:80",
            testing::SYN,
        ))
        .unwrap();
        assert_eq!(packet.l3_proto(), L3Proto::Ipv6);
        assert_eq!(packet.l4_proto(), L4Proto::Tcp);
        assert_eq!(packet.tuple().src(), "[2001:db8::1]:1234".parse().unwrap());
        assert_eq!(packet.tuple().dst(), "[64:ff9b::c633:6401]:80".parse().unwrap());
        assert!(packet.tcp_flags().syn);
        assert!(!packet.tcp_flags().fin);
        assert_eq!(packet.hop_limit(), 64);
    }

    #[test]
    fn test_parse_ipv4_udp() {
        let packet =
            Packet::parse(testing::udp_v4("198.51.100.1:53", "192.0.2.1:61001", b"hi")).unwrap();
        assert_eq!(packet.l3_proto(), L3Proto::Ipv4);
        assert_eq!(packet.tuple().dst(), "192.0.2.1:61001".parse().unwrap());
        assert_eq!(packet.l3_payload().len(), 8 + 2);
    }

    #[test]
    fn test_parse_echo() {
        let packet = Packet::parse(testing::echo_v6(
            "2001:db8::1",
            "64:ff9b::c633:6401",
            testing::ECHO_REQUEST_V6,
            42,
        ))
        .unwrap();
        assert_eq!(packet.icmp_kind(), Some(IcmpKind::EchoRequest));
        assert_eq!(packet.tuple().icmp_id(), Some(42));
        assert_eq!(packet.tuple().dst().port(), 42);
    }

    #[test]
    fn test_parse_icmp_error_uses_quoted_tuple() {
        let quoted = testing::udp_v4("192.0.2.1:61001", "198.51.100.1:53", b"");
        let packet =
            Packet::parse(testing::icmp_error_v4("203.0.113.9", "192.0.2.1", &quoted)).unwrap();
        assert_eq!(packet.l4_proto(), L4Proto::Icmp);
        assert!(packet.is_icmp_error());
        assert_eq!(packet.tuple().l4_proto(), L4Proto::Udp);
        assert_eq!(packet.tuple().src(), "198.51.100.1:53".parse().unwrap());
        assert_eq!(packet.tuple().dst(), "192.0.2.1:61001".parse().unwrap());
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(
            Packet::parse(Vec::new()),
            Err(PacketError::TooShort {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            Packet::parse(vec![0x50; 40]),
            Err(PacketError::UnsupportedVersion(5))
        );

        let mut truncated = testing::tcp_v6("[2001:db8::1]:1", "[64:ff9b::1]:2", testing::SYN);
        truncated.truncate(50);
        assert!(matches!(Packet::parse(truncated), Err(PacketError::TooShort { .. })));

        // Neighbor solicitations are left to the host
        let ndp = testing::echo_v6("fe80::1", "ff02::1:ff00:1", 135, 0);
        let error = Packet::parse(ndp).unwrap_err();
        assert_eq!(error, PacketError::UnsupportedIcmpv6Type(135));
        assert!(error.is_unsupported());
    }
}
