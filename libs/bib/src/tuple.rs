use std::{
    fmt,
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
};

use crate::TupleError;

/// Network layer protocol of a tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L3Proto {
    Ipv4,
    Ipv6,
}

impl fmt::Display for L3Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// Transport layer protocol of a tuple.
///
/// ICMP and ICMPv6 are treated as the same protocol since they translate into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum L4Proto {
    Tcp,
    Udp,
    Icmp,
}

impl L4Proto {
    /// Every supported transport protocol
    pub const ALL: [Self; 3] = [Self::Tcp, Self::Udp, Self::Icmp];

    /// Look up the protocol carried by an IPv4 packet
    #[must_use]
    pub fn from_ipv4_protocol(protocol: u8) -> Option<Self> {
        match protocol {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            1 => Some(Self::Icmp),
            _ => None,
        }
    }

    /// Look up the protocol carried by an IPv6 packet
    #[must_use]
    pub fn from_ipv6_next_header(next_header: u8) -> Option<Self> {
        match next_header {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            58 => Some(Self::Icmp),
            _ => None,
        }
    }
}

impl fmt::Display for L4Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Icmp => write!(f, "ICMP"),
        }
    }
}

/// A transport-level flow identifier.
///
/// For ICMP, both "ports" hold the ICMP identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple {
    src: SocketAddr,
    dst: SocketAddr,
    l4: L4Proto,
}

impl Tuple {
    /// Build a tuple. Both addresses must belong to the same family.
    pub fn new(src: SocketAddr, dst: SocketAddr, l4: L4Proto) -> Result<Self, TupleError> {
        if src.is_ipv4() != dst.is_ipv4() {
            return Err(TupleError::MismatchedAddressFamily);
        }
        Ok(Self { src, dst, l4 })
    }

    /// Build an IPv4 tuple
    #[must_use]
    pub fn v4(src: SocketAddrV4, dst: SocketAddrV4, l4: L4Proto) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            l4,
        }
    }

    /// Build an IPv6 tuple
    #[must_use]
    pub fn v6(src: SocketAddrV6, dst: SocketAddrV6, l4: L4Proto) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            l4,
        }
    }

    #[must_use]
    pub fn src(&self) -> SocketAddr {
        self.src
    }

    #[must_use]
    pub fn dst(&self) -> SocketAddr {
        self.dst
    }

    #[must_use]
    pub fn l4_proto(&self) -> L4Proto {
        self.l4
    }

    /// Network layer protocol, derived from the address family
    #[must_use]
    pub fn l3_proto(&self) -> L3Proto {
        match self.src {
            SocketAddr::V4(_) => L3Proto::Ipv4,
            SocketAddr::V6(_) => L3Proto::Ipv6,
        }
    }

    #[must_use]
    pub fn src_v4(&self) -> Option<SocketAddrV4> {
        match self.src {
            SocketAddr::V4(addr) => Some(addr),
            SocketAddr::V6(_) => None,
        }
    }

    #[must_use]
    pub fn dst_v4(&self) -> Option<SocketAddrV4> {
        match self.dst {
            SocketAddr::V4(addr) => Some(addr),
            SocketAddr::V6(_) => None,
        }
    }

    #[must_use]
    pub fn src_v6(&self) -> Option<SocketAddrV6> {
        match self.src {
            SocketAddr::V6(addr) => Some(addr),
            SocketAddr::V4(_) => None,
        }
    }

    #[must_use]
    pub fn dst_v6(&self) -> Option<SocketAddrV6> {
        match self.dst {
            SocketAddr::V6(addr) => Some(addr),
            SocketAddr::V4(_) => None,
        }
    }

    /// The same flow seen from the other end
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            l4: self.l4,
        }
    }

    /// The ICMP identifier, if this is an ICMP tuple
    #[must_use]
    pub fn icmp_id(&self) -> Option<u16> {
        match self.l4 {
            L4Proto::Icmp => Some(self.src.port()),
            _ => None,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.l4, self.src, self.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_family() {
        assert_eq!(
            Tuple::new(
                "192.0.2.1:1000".parse().unwrap(),
                "[2001:db8::1]:80".parse().unwrap(),
                L4Proto::Tcp
            ),
            Err(TupleError::MismatchedAddressFamily)
        );
    }

    #[test]
    fn test_l3_proto() {
        let tuple = Tuple::v4(
            "192.0.2.1:1000".parse().unwrap(),
            "198.51.100.1:80".parse().unwrap(),
            L4Proto::Tcp,
        );
        assert_eq!(tuple.l3_proto(), L3Proto::Ipv4);
        assert!(tuple.src_v6().is_none());
        assert_eq!(tuple.reversed().l3_proto(), L3Proto::Ipv4);

        let tuple = Tuple::v6(
            "[2001:db8::1]:1000".parse().unwrap(),
            "[64:ff9b::c633:6401]:80".parse().unwrap(),
            L4Proto::Udp,
        );
        assert_eq!(tuple.l3_proto(), L3Proto::Ipv6);
        assert!(tuple.dst_v4().is_none());
    }

    #[test]
    fn test_reversed() {
        let tuple = Tuple::v4(
            "192.0.2.1:1000".parse().unwrap(),
            "198.51.100.1:80".parse().unwrap(),
            L4Proto::Udp,
        );
        let reversed = tuple.reversed();
        assert_eq!(reversed.src(), tuple.dst());
        assert_eq!(reversed.dst(), tuple.src());
        assert_eq!(reversed.reversed(), tuple);
    }

    #[test]
    fn test_protocol_numbers() {
        assert_eq!(L4Proto::from_ipv4_protocol(1), Some(L4Proto::Icmp));
        assert_eq!(L4Proto::from_ipv6_next_header(58), Some(L4Proto::Icmp));
        assert_eq!(L4Proto::from_ipv6_next_header(1), None);
        assert_eq!(L4Proto::from_ipv4_protocol(132), None);
    }
}
