//! Port rewriting for TCP and UDP

use std::net::{SocketAddrV4, SocketAddrV6};

use pnet::packet::{
    tcp::{self, MutableTcpPacket, TcpPacket},
    udp::{self, MutableUdpPacket, UdpPacket},
};

use crate::packet::PacketError;

/// The addressing a translated packet's pseudo-header is built from
#[derive(Debug, Clone, Copy)]
pub(super) enum Endpoints {
    V4(SocketAddrV4, SocketAddrV4),
    V6(SocketAddrV6, SocketAddrV6),
}

impl Endpoints {
    pub(super) fn ports(&self) -> (u16, u16) {
        match self {
            Self::V4(src, dst) => (src.port(), dst.port()),
            Self::V6(src, dst) => (src.port(), dst.port()),
        }
    }
}

/// Rewrites a TCP segment's ports and re-calculates its checksum with the new pseudo-header
#[profiling::function]
pub(super) fn rewrite_tcp(segment: &[u8], endpoints: &Endpoints) -> Result<Vec<u8>, PacketError> {
    let mut buffer = segment.to_vec();
    let mut tcp_packet = MutableTcpPacket::new(&mut buffer).ok_or(PacketError::TooShort {
        expected: TcpPacket::minimum_packet_size(),
        actual: segment.len(),
    })?;

    let (src_port, dst_port) = endpoints.ports();
    tcp_packet.set_source(src_port);
    tcp_packet.set_destination(dst_port);
    tcp_packet.set_checksum(0);
    let checksum = match endpoints {
        Endpoints::V4(src, dst) => {
            tcp::ipv4_checksum(&tcp_packet.to_immutable(), src.ip(), dst.ip())
        }
        Endpoints::V6(src, dst) => {
            tcp::ipv6_checksum(&tcp_packet.to_immutable(), src.ip(), dst.ip())
        }
    };
    tcp_packet.set_checksum(checksum);

    Ok(buffer)
}

/// Rewrites a UDP datagram's ports and re-calculates its checksum with the new pseudo-header
#[profiling::function]
pub(super) fn rewrite_udp(datagram: &[u8], endpoints: &Endpoints) -> Result<Vec<u8>, PacketError> {
    let mut buffer = datagram.to_vec();
    let mut udp_packet = MutableUdpPacket::new(&mut buffer).ok_or(PacketError::TooShort {
        expected: UdpPacket::minimum_packet_size(),
        actual: datagram.len(),
    })?;

    let (src_port, dst_port) = endpoints.ports();
    udp_packet.set_source(src_port);
    udp_packet.set_destination(dst_port);
    udp_packet.set_checksum(0);
    let checksum = match endpoints {
        Endpoints::V4(src, dst) => {
            udp::ipv4_checksum(&udp_packet.to_immutable(), src.ip(), dst.ip())
        }
        // A zero checksum is not allowed over IPv6
        Endpoints::V6(src, dst) => {
            match udp::ipv6_checksum(&udp_packet.to_immutable(), src.ip(), dst.ip()) {
                0 => 0xffff,
                checksum => checksum,
            }
        }
    };
    udp_packet.set_checksum(checksum);

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4() -> Endpoints {
        Endpoints::V4(
            "192.0.2.1:61001".parse().unwrap(),
            "198.51.100.1:80".parse().unwrap(),
        )
    }

    #[test]
    fn test_rewrite_tcp() {
        let mut segment = vec![0u8; 20];
        segment[12] = 5 << 4;
        let rewritten = rewrite_tcp(&segment, &v4()).unwrap();
        let tcp_packet = TcpPacket::new(&rewritten).unwrap();
        assert_eq!(tcp_packet.get_source(), 61001);
        assert_eq!(tcp_packet.get_destination(), 80);
        assert_eq!(
            tcp_packet.get_checksum(),
            tcp::ipv4_checksum(
                &tcp_packet,
                &"192.0.2.1".parse().unwrap(),
                &"198.51.100.1".parse().unwrap()
            )
        );
    }

    #[test]
    fn test_short_segments() {
        assert_eq!(
            rewrite_tcp(&[0u8; 10], &v4()),
            Err(PacketError::TooShort {
                expected: 20,
                actual: 10
            })
        );
        assert!(rewrite_udp(&[0u8; 4], &v4()).is_err());
    }
}
