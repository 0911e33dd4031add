//! Packet body translation

use std::net::SocketAddr;

use bib::{L3Proto, L4Proto, Tuple};

use crate::{packet::Packet, Error, Halt, Step};

mod icmp;
mod ip;
mod transport;

use transport::Endpoints;

/// Rewrites a packet so that it carries the addressing of `out`, in `out`'s address family
pub trait PacketTranslator: Send + Sync {
    fn translate(&self, out: &Tuple, packet: &Packet) -> Step<Packet>;
}

/// Translates TCP, UDP and ICMP echo messages.
///
/// The network header is rebuilt from scratch, transport ports (or ICMP identifiers) are
/// replaced and checksums recalculated against the new pseudo-header. ICMP errors are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderTranslator;

impl PacketTranslator for HeaderTranslator {
    #[profiling::function]
    fn translate(&self, out: &Tuple, packet: &Packet) -> Step<Packet> {
        if packet.is_icmp_error() {
            log::debug!("Not translating ICMP error for {}", packet.tuple());
            return Err(Halt::Drop);
        }
        if packet.l3_proto() == out.l3_proto() {
            return Err(Error::Inconsistent(format!(
                "Asked to translate {} into its own address family",
                packet.tuple()
            ))
            .into());
        }

        let endpoints = match (out.src(), out.dst()) {
            (SocketAddr::V4(src), SocketAddr::V4(dst)) => Endpoints::V4(src, dst),
            (SocketAddr::V6(src), SocketAddr::V6(dst)) => Endpoints::V6(src, dst),
            _ => {
                return Err(Error::Inconsistent(format!("Mixed address families in {out}")).into())
            }
        };

        let payload = match packet.l4_proto() {
            L4Proto::Tcp => transport::rewrite_tcp(packet.l3_payload(), &endpoints)?,
            L4Proto::Udp => transport::rewrite_udp(packet.l3_payload(), &endpoints)?,
            L4Proto::Icmp => icmp::translate_echo(packet.l3_payload(), &endpoints)?,
        };

        let bytes = match endpoints {
            Endpoints::V4(src, dst) => ip::build_ipv4(
                *src.ip(),
                *dst.ip(),
                packet.l4_proto(),
                packet.hop_limit(),
                &payload,
            )?,
            Endpoints::V6(src, dst) => ip::build_ipv6(
                *src.ip(),
                *dst.ip(),
                packet.l4_proto(),
                packet.hop_limit(),
                &payload,
            )?,
        };

        log::trace!(
            "Translated {} packet {} into {}",
            match out.l3_proto() {
                L3Proto::Ipv4 => "IPv6",
                L3Proto::Ipv6 => "IPv4",
            },
            packet.tuple(),
            out
        );
        Ok(Packet::parse(bytes)?)
    }
}
