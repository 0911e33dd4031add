//! Utilities for interacting with [RFC6052](https://datatracker.ietf.org/doc/html/rfc6052) "IPv4-Embedded IPv6 Addresses"

use std::{
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use ipnet::Ipv6Net;

/// All allowed IPv6 prefix lengths according to [RFC6052 Section 2.2](https://datatracker.ietf.org/doc/html/rfc6052#section-2.2)
pub const ALLOWED_PREFIX_LENS: [u8; 6] = [32, 40, 48, 56, 64, 96];

/// Bits 64 to 71 of an embedded address are reserved and must stay zero
const RESERVED_OCTET: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
#[error("Invalid IPv6 prefix length: {0}. Must be one of 32, 40, 48, 56, 64, or 96")]
pub struct InvalidPrefixLength(pub u8);

/// The IPv6 prefix IPv4 addresses are embedded into ("pool6")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool6(Ipv6Net);

impl Pool6 {
    /// Wrap a prefix, checking that its length is one RFC6052 allows
    pub fn new(prefix: Ipv6Net) -> Result<Self, InvalidPrefixLength> {
        if !ALLOWED_PREFIX_LENS.contains(&prefix.prefix_len()) {
            return Err(InvalidPrefixLength(prefix.prefix_len()));
        }
        Ok(Self(prefix.trunc()))
    }

    #[must_use]
    pub fn prefix(&self) -> Ipv6Net {
        self.0
    }

    #[must_use]
    pub fn contains(&self, addr: &Ipv6Addr) -> bool {
        self.0.contains(addr)
    }

    /// Where each IPv4 octet lives inside the IPv6 address
    fn octet_positions(&self) -> impl Iterator<Item = usize> {
        (usize::from(self.0.prefix_len() / 8)..)
            .filter(|position| *position != RESERVED_OCTET)
            .take(4)
    }

    /// Embed an IPv4 address into this prefix
    #[must_use]
    #[profiling::function]
    pub fn embed(&self, addr: Ipv4Addr) -> Ipv6Addr {
        let mut octets = self.0.network().octets();
        for (position, octet) in self.octet_positions().zip(addr.octets()) {
            octets[position] = octet;
        }
        Ipv6Addr::from(octets)
    }

    /// Extract the IPv4 address embedded in `addr`, if `addr` belongs to this prefix
    #[must_use]
    #[profiling::function]
    pub fn extract(&self, addr: Ipv6Addr) -> Option<Ipv4Addr> {
        if !self.contains(&addr) {
            return None;
        }
        let source = addr.octets();
        let last = self.octet_positions().last().unwrap_or(RESERVED_OCTET);

        // The u-octet and the suffix must be zero, otherwise several addresses would map to
        // the same IPv4 address
        let padding_is_zero = (usize::from(self.0.prefix_len() / 8)..source.len())
            .filter(|position| *position == RESERVED_OCTET || *position > last)
            .all(|position| source[position] == 0);
        if !padding_is_zero {
            return None;
        }

        let mut octets = [0u8; 4];
        for (octet, position) in octets.iter_mut().zip(self.octet_positions()) {
            *octet = source[position];
        }
        Some(Ipv4Addr::from(octets))
    }
}

impl TryFrom<Ipv6Net> for Pool6 {
    type Error = InvalidPrefixLength;

    fn try_from(prefix: Ipv6Net) -> Result<Self, Self::Error> {
        Self::new(prefix)
    }
}

/// Parses an [RFC6052 Section 2.2](https://datatracker.ietf.org/doc/html/rfc6052#section-2.2)-compliant IPv6 prefix from a string
pub fn parse_network_specific_prefix(string: &str) -> Result<Ipv6Net, String> {
    let net = Ipv6Net::from_str(string).map_err(|err| err.to_string())?;
    Pool6::new(net).map_err(|err| err.to_string())?;
    Ok(net)
}
