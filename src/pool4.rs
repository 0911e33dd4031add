//! The IPv4 transport addresses a stateful translator hands out

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use addrpool::Pool;
use bib::L4Proto;
use ipnet::Ipv4Net;

use crate::config::{Pool4Config, PortRange};

/// One protocol's share of pool4
#[derive(Debug)]
struct ProtocolPool {
    prefixes: Pool,
    ports: PortRange,
}

/// Pool4: a prefix pool and a port range for each of TCP, UDP and ICMP
#[derive(Debug)]
pub struct Pool4 {
    tcp: ProtocolPool,
    udp: ProtocolPool,
    icmp: ProtocolPool,
    max_iterations: Option<u32>,
}

impl Pool4 {
    #[must_use]
    pub fn new(config: &Pool4Config) -> Self {
        let build = |l4| ProtocolPool {
            prefixes: Pool::from_prefixes(config.protocol(l4).prefixes.iter().copied()),
            ports: config.ports(l4),
        };
        Self {
            tcp: build(L4Proto::Tcp),
            udp: build(L4Proto::Udp),
            icmp: build(L4Proto::Icmp),
            max_iterations: config.max_iterations,
        }
    }

    fn protocol(&self, l4: L4Proto) -> &ProtocolPool {
        match l4 {
            L4Proto::Tcp => &self.tcp,
            L4Proto::Udp => &self.udp,
            L4Proto::Icmp => &self.icmp,
        }
    }

    /// The prefix pool of a protocol
    #[must_use]
    pub fn pool(&self, l4: L4Proto) -> &Pool {
        &self.protocol(l4).prefixes
    }

    #[must_use]
    pub fn port_range(&self, l4: L4Proto) -> PortRange {
        self.protocol(l4).ports
    }

    #[must_use]
    pub fn max_iterations(&self) -> Option<u32> {
        self.max_iterations
    }

    /// Check if `addr` belongs to the protocol's pool
    #[must_use]
    pub fn contains(&self, l4: L4Proto, addr: Ipv4Addr) -> bool {
        self.pool(l4).contains(addr)
    }

    /// Check if `addr` belongs to any protocol's pool
    #[must_use]
    pub fn contains_any(&self, addr: Ipv4Addr) -> bool {
        L4Proto::ALL.iter().any(|l4| self.contains(*l4, addr))
    }

    /// Check if `endpoint` is something the protocol could hand out
    #[must_use]
    pub fn contains_endpoint(&self, l4: L4Proto, endpoint: SocketAddrV4) -> bool {
        self.contains(l4, *endpoint.ip()) && self.port_range(l4).contains(endpoint.port())
    }

    /// Every transport address the protocol may hand out, as of now
    #[must_use]
    pub fn candidates(&self, l4: L4Proto) -> Candidates {
        let protocol = self.protocol(l4);
        Candidates::new(protocol.prefixes.snapshot(), protocol.ports)
    }

    /// Number of transport addresses the protocol may hand out
    #[must_use]
    pub fn size(&self, l4: L4Proto) -> u64 {
        self.candidates(l4).len()
    }
}

/// Hosts of a prefix, the way `Ipv4Net::hosts` counts them
fn host_range(prefix: &Ipv4Net) -> (Ipv4Addr, u64) {
    let size = 1u64 << (32 - prefix.prefix_len());
    match prefix.prefix_len() {
        31 | 32 => (prefix.network(), size),
        _ => (Ipv4Addr::from(u32::from(prefix.network()) + 1), size - 2),
    }
}

/// An indexable view of (address, port) pairs over a pool4 snapshot.
///
/// Index `i` maps to host `i / ports` and port `first + i % ports`, so walking consecutive
/// indexes exhausts one address's ports before moving to the next address.
#[derive(Debug, Clone)]
pub struct Candidates {
    prefixes: Arc<[Ipv4Net]>,
    /// Index of the first host of each prefix
    starts: Vec<u64>,
    hosts: u64,
    ports: PortRange,
}

impl Candidates {
    fn new(prefixes: Arc<[Ipv4Net]>, ports: PortRange) -> Self {
        let mut starts = Vec::with_capacity(prefixes.len());
        let mut hosts = 0;
        for prefix in prefixes.iter() {
            starts.push(hosts);
            hosts += host_range(prefix).1;
        }
        Self {
            prefixes,
            starts,
            hosts,
            ports,
        }
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.hosts * u64::from(self.ports.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a single candidate
    #[must_use]
    pub fn get(&self, index: u64) -> Option<SocketAddrV4> {
        if index >= self.len() {
            return None;
        }
        let ports = u64::from(self.ports.len());
        let host = index / ports;
        let port = self.ports.first + u16::try_from(index % ports).ok()?;

        // Find the prefix this host falls into
        let slot = self.starts.partition_point(|start| *start <= host) - 1;
        let (first, _) = host_range(&self.prefixes[slot]);
        let offset = u32::try_from(host - self.starts[slot]).ok()?;
        Some(SocketAddrV4::new(Ipv4Addr::from(u32::from(first) + offset), port))
    }

    /// Walk every candidate once, starting at `start` and wrapping around
    pub fn iter_from(&self, start: u64) -> impl Iterator<Item = SocketAddrV4> + '_ {
        let len = self.len();
        (0..len).filter_map(move |step| self.get((start % len + step) % len))
    }
}
