//! Filtering and updating of session state

use std::{
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
    time::Instant,
};

use bib::{L3Proto, L4Proto, Session, SessionState, Tuple};

use crate::{
    packet::{IcmpKind, Packet, TcpFlags},
    Error, Halt, Step, Xlator,
};

use super::compute_outgoing_tuple;

/// Decide whether a packet may pass, creating or refreshing its session on the way.
///
/// `Ok(())` means the packet belongs to a session that now exists and is up to date.
/// Packets that are not addressed to this translator halt with `Accept`.
#[profiling::function]
pub fn filtering_and_updating(x: &Xlator, packet: &Packet, tuple: &Tuple) -> Step<()> {
    match (tuple.src(), tuple.dst()) {
        (SocketAddr::V6(src), SocketAddr::V6(dst)) => filter_6(x, packet, tuple, src, dst),
        (SocketAddr::V4(src), SocketAddr::V4(dst)) => filter_4(x, packet, tuple, src, dst),
        _ => Err(Error::Inconsistent(format!("Mixed address families in {tuple}")).into()),
    }
}

fn filter_6(
    x: &Xlator,
    packet: &Packet,
    tuple: &Tuple,
    src: SocketAddrV6,
    dst: SocketAddrV6,
) -> Step<()> {
    if !x.pool6().contains(dst.ip()) {
        log::trace!("{} is not addressed to pool6", tuple);
        return Err(Halt::Accept);
    }
    if x.pool6().contains(src.ip()) {
        log::debug!("Dropping {}: source is inside pool6", tuple);
        return Err(Halt::Drop);
    }

    if let Some(session) = x.sessions().get_by_v6(tuple) {
        update(x, &session, L3Proto::Ipv6, packet.tcp_flags());
        return Ok(());
    }

    if packet.is_icmp_error() {
        log::debug!("Dropping ICMPv6 error for unknown session {}", tuple);
        return Err(Halt::Drop);
    }
    match tuple.l4_proto() {
        L4Proto::Tcp if !packet.tcp_flags().syn => {
            log::debug!("Dropping {}: TCP sessions start with a SYN", tuple);
            return Err(Halt::Drop);
        }
        L4Proto::Icmp if packet.icmp_kind() != Some(IcmpKind::EchoRequest) => {
            log::debug!("Dropping {}: only echo requests open ICMP sessions", tuple);
            return Err(Halt::Drop);
        }
        _ => {}
    }

    let outer = compute_outgoing_tuple(x, tuple, packet)?;
    create(x, *tuple, outer, L3Proto::Ipv6, packet.tcp_flags())
}

fn filter_4(
    x: &Xlator,
    packet: &Packet,
    tuple: &Tuple,
    src: SocketAddrV4,
    dst: SocketAddrV4,
) -> Step<()> {
    let l4 = tuple.l4_proto();
    if !x.pool4().contains(l4, *dst.ip()) {
        log::trace!("{} is not addressed to pool4", tuple);
        return Err(Halt::Accept);
    }

    if let Some(session) = x.sessions().get_by_v4(tuple) {
        update(x, &session, L3Proto::Ipv4, packet.tcp_flags());
        return Ok(());
    }

    if packet.is_icmp_error() {
        log::debug!("Dropping ICMP error for unknown session {}", tuple);
        return Err(Halt::Drop);
    }
    let Some(binding) = x.bindings().get_by_v4(l4, dst) else {
        log::debug!("Dropping {}: nothing is bound to {}", tuple, dst);
        return Err(Halt::Drop);
    };
    match l4 {
        L4Proto::Icmp => {
            log::debug!("Dropping {}: ICMP sessions cannot be opened from IPv4", tuple);
            return Err(Halt::Drop);
        }
        L4Proto::Udp if x.config().address_dependent_filtering => {
            log::debug!("Dropping {}: no session with this IPv4 node", tuple);
            return Err(Halt::Drop);
        }
        L4Proto::Tcp if !packet.tcp_flags().syn || x.config().drop_externally_initiated_tcp => {
            log::debug!("Dropping externally initiated TCP {}", tuple);
            return Err(Halt::Drop);
        }
        _ => {}
    }

    let inner = Tuple::v6(
        binding.v6,
        SocketAddrV6::new(x.pool6().embed(*src.ip()), src.port(), 0, 0),
        l4,
    );
    create(x, inner, tuple.reversed(), L3Proto::Ipv4, packet.tcp_flags())
}

/// Where a session goes after a packet from `from` is seen
pub(crate) fn next_state(
    l4: L4Proto,
    current: SessionState,
    from: L3Proto,
    flags: TcpFlags,
) -> SessionState {
    if l4 == L4Proto::Tcp && (flags.fin || flags.rst) {
        return SessionState::Closing;
    }
    match current {
        SessionState::Establishing { initiator } if initiator != from => SessionState::Established,
        state => state,
    }
}

fn create(x: &Xlator, inner: Tuple, outer: Tuple, from: L3Proto, flags: TcpFlags) -> Step<()> {
    let l4 = inner.l4_proto();
    let state = next_state(
        l4,
        SessionState::Establishing { initiator: from },
        from,
        flags,
    );
    let session = Session {
        inner,
        outer,
        state,
        expires: Instant::now() + x.config().timeouts.session_lifetime(l4, state),
    };

    let (existing, inserted) = x.sessions().insert_or_get(session).map_err(|error| {
        log::debug!("Dropping {}: {}", inner, error);
        Halt::Drop
    })?;
    if !inserted {
        // Lost the race against another packet of the same flow
        update(x, &existing, from, flags);
        return Ok(());
    }

    // The sweeper may have released the binding since the outer tuple was computed. Pushing its
    // expiry past the session's keeps it alive from now on, as long as it is still there
    let bound = existing
        .bound_endpoint()
        .and_then(|(l4, v6)| x.bindings().refresh(l4, v6, existing.expires));
    if bound.map(|binding| SocketAddr::V4(binding.v4)) != Some(existing.outer.src()) {
        log::debug!("Dropping {}: its binding was released meanwhile", inner);
        x.sessions().remove(&existing.inner);
        return Err(Halt::Drop);
    }
    Ok(())
}

fn update(x: &Xlator, session: &Session, from: L3Proto, flags: TcpFlags) {
    let l4 = session.inner.l4_proto();
    let timeouts = x.config().timeouts;
    let now = Instant::now();
    let updated = x.sessions().update(&session.inner, |session| {
        session.state = next_state(l4, session.state, from, flags);
        session.expires = now + timeouts.session_lifetime(l4, session.state);
    });
    if let Some(updated) = updated {
        log::trace!("Session {} is now {:?}", updated.inner, updated.state);
        refresh_binding(x, &updated);
    }
}

fn refresh_binding(x: &Xlator, session: &Session) {
    if let Some((l4, v6)) = session.bound_endpoint() {
        x.bindings().refresh(l4, v6, session.expires);
    }
}
