//! ICMP echo <-> ICMPv6 echo

use pnet::packet::{
    icmp::{self, IcmpPacket, IcmpType, MutableIcmpPacket},
    icmpv6::{self, Icmpv6Packet, Icmpv6Type, MutableIcmpv6Packet},
};

use super::transport::Endpoints;
use crate::packet::PacketError;

const ECHO_REQUEST: u8 = 8;
const ECHO_REPLY: u8 = 0;
const ECHOV6_REQUEST: u8 = 128;
const ECHOV6_REPLY: u8 = 129;

/// Translates an echo message into the other ICMP version.
///
/// `endpoints` are the new addresses, and the source "port" is the identifier the message
/// should carry after translation.
#[profiling::function]
pub(super) fn translate_echo(
    message: &[u8],
    endpoints: &Endpoints,
) -> Result<Vec<u8>, PacketError> {
    if message.len() < 8 {
        return Err(PacketError::TooShort {
            expected: 8,
            actual: message.len(),
        });
    }
    let mut buffer = message.to_vec();
    let (id, _) = endpoints.ports();
    buffer[4..6].copy_from_slice(&id.to_be_bytes());

    match endpoints {
        Endpoints::V4(..) => {
            let icmp_type = match message[0] {
                ECHOV6_REQUEST => ECHO_REQUEST,
                ECHOV6_REPLY => ECHO_REPLY,
                other => return Err(PacketError::UnsupportedIcmpv6Type(other)),
            };
            let mut icmp_packet = MutableIcmpPacket::new(&mut buffer).ok_or(PacketError::TooShort {
                expected: IcmpPacket::minimum_packet_size(),
                actual: message.len(),
            })?;
            icmp_packet.set_icmp_type(IcmpType(icmp_type));
            icmp_packet.set_checksum(0);
            icmp_packet.set_checksum(icmp::checksum(&icmp_packet.to_immutable()));
        }
        Endpoints::V6(src, dst) => {
            let icmpv6_type = match message[0] {
                ECHO_REQUEST => ECHOV6_REQUEST,
                ECHO_REPLY => ECHOV6_REPLY,
                other => return Err(PacketError::UnsupportedIcmpType(other)),
            };
            let mut icmpv6_packet =
                MutableIcmpv6Packet::new(&mut buffer).ok_or(PacketError::TooShort {
                    expected: Icmpv6Packet::minimum_packet_size(),
                    actual: message.len(),
                })?;
            icmpv6_packet.set_icmpv6_type(Icmpv6Type(icmpv6_type));
            icmpv6_packet.set_checksum(0);
            icmpv6_packet.set_checksum(icmpv6::checksum(
                &icmpv6_packet.to_immutable(),
                src.ip(),
                dst.ip(),
            ));
        }
    }

    Ok(buffer)
}
