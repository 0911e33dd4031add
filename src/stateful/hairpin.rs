//! Hairpinning: IPv6 nodes reaching each other through their pool4 addresses

use bib::{L3Proto, Tuple};

use crate::{packet::Packet, Halt, L4Proto, Step, Xlator};

use super::{compute_outgoing_tuple, filtering_and_updating};

/// Check if a freshly translated tuple points back at this translator's own pool4
#[must_use]
pub fn is_hairpin(x: &Xlator, tuple: &Tuple) -> bool {
    tuple.l3_proto() == L3Proto::Ipv4
        && tuple
            .dst_v4()
            .is_some_and(|dst| x.pool4().contains(tuple.l4_proto(), *dst.ip()))
}

/// Run an already translated IPv4 packet through the translator again, as if it had just
/// arrived from the IPv4 network.
#[profiling::function]
pub fn handling_hairpinning(x: &Xlator, packet: &Packet, tuple: &Tuple) -> Step<()> {
    // Hairpinned ICMP is not supported, errors about TCP/UDP flows included
    if packet.l4_proto() == L4Proto::Icmp {
        log::debug!("Dropping hairpinned ICMP packet {}", tuple);
        return Err(Halt::Drop);
    }

    filtering_and_updating(x, packet, tuple)?;
    let out_tuple = compute_outgoing_tuple(x, tuple, packet)?;
    let out = x.translator().translate(&out_tuple, packet)?;
    log::debug!("Hairpinning {} -> {}", tuple, out_tuple);
    x.sender().send(packet, out)?;

    #[cfg(feature = "metrics")]
    crate::metrics::packet(out_tuple.l4_proto(), crate::metrics::Status::Hairpinned);
    Ok(())
}
