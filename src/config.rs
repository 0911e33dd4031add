//! Translator instance configuration

use std::{
    net::{Ipv6Addr, SocketAddrV4, SocketAddrV6},
    time::Duration,
};

use bib::{L4Proto, SessionState};
use ipnet::{Ipv4Net, Ipv6Net};

use crate::rfc6052::{InvalidPrefixLength, Pool6};

/// Which kind of translator this instance is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// RFC 6146 stateful NAT64
    #[default]
    Stateful,
    /// Stateless translation. This instance only keeps its pools around for administration
    Stateless,
}

/// An inclusive range of ports (or ICMP identifiers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PortRange {
    pub first: u16,
    pub last: u16,
}

impl PortRange {
    #[must_use]
    pub const fn new(first: u16, last: u16) -> Self {
        Self { first, last }
    }

    /// The range a protocol uses when none is configured
    #[must_use]
    pub const fn default_for(l4: L4Proto) -> Self {
        match l4 {
            L4Proto::Tcp | L4Proto::Udp => Self::new(61001, 65535),
            L4Proto::Icmp => Self::new(0, 65535),
        }
    }

    /// Number of ports in the range. Zero if the range is inverted
    #[must_use]
    pub fn len(&self) -> u32 {
        (u32::from(self.last) + 1).saturating_sub(u32::from(self.first))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        (self.first..=self.last).contains(&port)
    }
}

/// The pool4 entries of one transport protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ProtocolPoolConfig {
    /// IPv4 prefixes the protocol may hand out addresses from
    pub prefixes: Vec<Ipv4Net>,
    /// Ports (or ICMP identifiers) the protocol may hand out. Falls back to the protocol default
    pub ports: Option<PortRange>,
}

/// Per-protocol pool4 configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Pool4Config {
    pub tcp: ProtocolPoolConfig,
    pub udp: ProtocolPoolConfig,
    pub icmp: ProtocolPoolConfig,
    /// Upper bound on the number of candidates tried per allocation
    pub max_iterations: Option<u32>,
}

impl Pool4Config {
    /// Use the same prefixes for every protocol, with default port ranges
    #[must_use]
    pub fn shared(prefixes: &[Ipv4Net]) -> Self {
        let protocol = ProtocolPoolConfig {
            prefixes: prefixes.to_vec(),
            ports: None,
        };
        Self {
            tcp: protocol.clone(),
            udp: protocol.clone(),
            icmp: protocol,
            max_iterations: None,
        }
    }

    #[must_use]
    pub fn protocol(&self, l4: L4Proto) -> &ProtocolPoolConfig {
        match l4 {
            L4Proto::Tcp => &self.tcp,
            L4Proto::Udp => &self.udp,
            L4Proto::Icmp => &self.icmp,
        }
    }

    /// The port range in effect for a protocol
    #[must_use]
    pub fn ports(&self, l4: L4Proto) -> PortRange {
        self.protocol(l4)
            .ports
            .unwrap_or_else(|| PortRange::default_for(l4))
    }
}

/// Session lifetimes, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub tcp_established: u64,
    pub tcp_transitory: u64,
    pub udp: u64,
    pub icmp: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            tcp_established: 7200,
            tcp_transitory: 240,
            udp: 300,
            icmp: 60,
        }
    }
}

impl Timeouts {
    /// How long a session in `state` may stay idle
    #[must_use]
    pub fn session_lifetime(&self, l4: L4Proto, state: SessionState) -> Duration {
        Duration::from_secs(match (l4, state) {
            (L4Proto::Tcp, SessionState::Established) => self.tcp_established,
            (L4Proto::Tcp, _) => self.tcp_transitory,
            (L4Proto::Udp, _) => self.udp,
            (L4Proto::Icmp, _) => self.icmp,
        })
    }
}

/// An administrator-defined binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StaticBinding {
    pub protocol: L4Proto,
    pub ipv6: SocketAddrV6,
    pub ipv4: SocketAddrV4,
}

/// Everything an `Xlator` instance is configured with
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct XlatorConfig {
    pub mode: Mode,
    /// RFC6052 prefix IPv4 addresses are embedded into
    pub pool6: Ipv6Net,
    pub pool4: Pool4Config,
    /// Stateless only. IPv4 addresses that must never be translated
    pub blacklist: Vec<Ipv4Net>,
    /// Stateless only. RFC 6791 source addresses for untranslatable ICMP errors
    pub pool6791: Vec<Ipv4Net>,
    pub static_bindings: Vec<StaticBinding>,
    /// Only let IPv4 nodes in once the IPv6 node has talked to them
    pub address_dependent_filtering: bool,
    /// Refuse TCP connections opened from the IPv4 side
    pub drop_externally_initiated_tcp: bool,
    pub timeouts: Timeouts,
    /// Page size of administrative pool dumps
    pub max_entries_per_response: usize,
}

impl Default for XlatorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            pool6: well_known_prefix(),
            pool4: Pool4Config::default(),
            blacklist: Vec::new(),
            pool6791: Vec::new(),
            static_bindings: Vec::new(),
            address_dependent_filtering: false,
            drop_externally_initiated_tcp: false,
            timeouts: Timeouts::default(),
            max_entries_per_response: 50,
        }
    }
}

impl XlatorConfig {
    /// Check everything that can be checked without building the pools
    pub fn validate(&self) -> Result<Pool6, ConfigError> {
        let pool6 = Pool6::new(self.pool6)?;

        for l4 in L4Proto::ALL {
            let ports = self.pool4.ports(l4);
            if ports.is_empty() {
                return Err(ConfigError::InvalidPortRange {
                    protocol: l4,
                    first: ports.first,
                    last: ports.last,
                });
            }
        }

        if self.max_entries_per_response == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.pool4.max_iterations == Some(0) {
            return Err(ConfigError::InvalidMaxIterations);
        }

        Ok(pool6)
    }
}

/// The RFC6052 well-known prefix, `64:ff9b::/96`
#[must_use]
pub fn well_known_prefix() -> Ipv6Net {
    Ipv6Net::new(Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0), 96).unwrap_or_default()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid pool6: {0}")]
    InvalidPool6(#[from] InvalidPrefixLength),
    #[error("Invalid {protocol} port range {first}-{last}")]
    InvalidPortRange {
        protocol: L4Proto,
        first: u16,
        last: u16,
    },
    #[error("max_entries_per_response must be at least 1")]
    InvalidPageSize,
    #[error("max_iterations must be at least 1")]
    InvalidMaxIterations,
    #[error("Static binding {0} is not inside pool4")]
    StaticBindingOutsidePool4(SocketAddrV4),
    #[error("Static binding rejected: {0}")]
    StaticBinding(#[from] bib::BindingError),
}
