//! Outgoing tuple computation

use std::{
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
    time::Instant,
};

use bib::{Binding, BindingError, L3Proto, L4Proto, SessionState, Tuple};

use crate::{packet::Packet, Error, Halt, Step, Xlator};

/// Work out the tuple a packet will carry once translated.
///
/// Packets coming from the IPv6 side get an IPv4 transport address from the BIB, reserving a new
/// one from pool4 if their source has none yet. Packets coming from the IPv4 side are sent to
/// whichever IPv6 endpoint owns their destination.
#[profiling::function]
pub fn compute_outgoing_tuple(x: &Xlator, in_tuple: &Tuple, packet: &Packet) -> Step<Tuple> {
    match (in_tuple.src(), in_tuple.dst()) {
        (SocketAddr::V6(src), SocketAddr::V6(dst)) => outgoing_6to4(x, in_tuple, src, dst, packet),
        (SocketAddr::V4(src), SocketAddr::V4(dst)) => outgoing_4to6(x, in_tuple, src, dst),
        _ => Err(Error::Inconsistent(format!("Mixed address families in {in_tuple}")).into()),
    }
}

fn outgoing_6to4(
    x: &Xlator,
    in_tuple: &Tuple,
    src: SocketAddrV6,
    dst: SocketAddrV6,
    packet: &Packet,
) -> Step<Tuple> {
    let l4 = in_tuple.l4_proto();
    let Some(remote) = x.pool6().extract(*dst.ip()) else {
        log::debug!("{} is not inside pool6", dst.ip());
        return Err(Halt::Drop);
    };

    // Errors only ever travel along existing bindings
    let binding = if packet.is_icmp_error() {
        x.bindings().get_by_v6(l4, src).ok_or_else(|| {
            log::debug!("No binding for ICMP error about {}", in_tuple);
            Halt::Drop
        })?
    } else {
        allocate(x, l4, src, SocketAddrV4::new(remote, dst.port()))?
    };

    let remote_port = match l4 {
        L4Proto::Icmp => binding.v4.port(),
        L4Proto::Tcp | L4Proto::Udp => dst.port(),
    };
    Ok(Tuple::v4(binding.v4, SocketAddrV4::new(remote, remote_port), l4))
}

fn outgoing_4to6(
    x: &Xlator,
    in_tuple: &Tuple,
    src: SocketAddrV4,
    dst: SocketAddrV4,
) -> Step<Tuple> {
    let l4 = in_tuple.l4_proto();
    let Some(binding) = x.bindings().get_by_v4(l4, dst) else {
        log::debug!("No {} binding for {}", l4, dst);
        return Err(Halt::Drop);
    };

    let remote_port = match l4 {
        L4Proto::Icmp => binding.v6.port(),
        L4Proto::Tcp | L4Proto::Udp => src.port(),
    };
    Ok(Tuple::v6(
        SocketAddrV6::new(x.pool6().embed(*src.ip()), remote_port, 0, 0),
        binding.v6,
        l4,
    ))
}

/// Find or reserve the IPv4 transport address `v6` is seen as
fn allocate(x: &Xlator, l4: L4Proto, v6: SocketAddrV6, remote: SocketAddrV4) -> Step<Binding> {
    if let Some(binding) = x.bindings().get_by_v6(l4, v6) {
        return Ok(binding);
    }

    let candidates = x.pool4().candidates(l4);
    let limit = match x.pool4().max_iterations() {
        Some(max) => candidates.len().min(u64::from(max)),
        None => candidates.len(),
    };
    let start = if candidates.is_empty() {
        0
    } else {
        x.allocation_offset(v6, remote) % candidates.len()
    };
    let expires = Instant::now()
        + x.config().timeouts.session_lifetime(
            l4,
            SessionState::Establishing {
                initiator: L3Proto::Ipv6,
            },
        );

    let walk = candidates
        .iter_from(start)
        .take(usize::try_from(limit).unwrap_or(usize::MAX));
    match x.bindings().get_or_bind(l4, v6, walk, expires) {
        Ok(binding) => Ok(binding),
        Err(BindingError::Exhausted(l4)) => {
            log::warn!(
                "Pool4 exhausted: no free {} transport address for {} after {} tries",
                l4,
                v6,
                limit
            );
            #[cfg(feature = "metrics")]
            crate::metrics::allocation_exhausted(l4);
            Err(Halt::Drop)
        }
        Err(error) => Err(Error::from(error).into()),
    }
}
