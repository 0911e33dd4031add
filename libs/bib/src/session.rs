use std::{net::SocketAddrV6, time::Instant};

use dashmap::{mapref::entry::Entry, DashMap};
use rustc_hash::FxHashSet;

use crate::{L3Proto, L4Proto, SessionError, Tuple};

/// Where a session is in its (simplified) lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Only the `initiator` side has spoken so far
    Establishing { initiator: L3Proto },
    /// Both sides have spoken
    Established,
    /// A FIN or RST has been seen
    Closing,
}

/// A single flow between an IPv6 node and an IPv4 node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// The flow as the IPv6 node sends it
    pub inner: Tuple,
    /// The flow as the translator sends it out to the IPv4 node
    pub outer: Tuple,
    pub state: SessionState,
    pub expires: Instant,
}

impl Session {
    /// The IPv6 endpoint (and protocol) whose binding this session relies on
    #[must_use]
    pub fn bound_endpoint(&self) -> Option<(L4Proto, SocketAddrV6)> {
        Some((self.inner.l4_proto(), self.inner.src_v6()?))
    }
}

/// All live sessions, indexed from both sides
#[derive(Debug, Default)]
pub struct SessionTable {
    /// Sessions keyed by their IPv6-side tuple
    by_v6: DashMap<Tuple, Session>,
    /// Outer tuple -> inner tuple
    by_v4: DashMap<Tuple, Tuple>,
}

impl SessionTable {
    /// Construct a new empty `SessionTable`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the session for a packet sent by an IPv6 node
    #[must_use]
    #[profiling::function]
    pub fn get_by_v6(&self, inner: &Tuple) -> Option<Session> {
        self.by_v6.get(inner).map(|session| *session)
    }

    /// Find the session for a packet sent by an IPv4 node
    #[must_use]
    #[profiling::function]
    pub fn get_by_v4(&self, incoming: &Tuple) -> Option<Session> {
        let outer = incoming.reversed();
        let inner = *self.by_v4.get(&outer)?;
        self.get_by_v6(&inner).filter(|session| session.outer == outer)
    }

    /// Insert a session unless one already exists for the same IPv6-side tuple.
    ///
    /// Returns the session that ended up in the table, and whether it is the one passed in.
    /// Fails if another flow already translates to the same outer tuple.
    pub fn insert_or_get(&self, session: Session) -> Result<(Session, bool), SessionError> {
        // Claim the outer tuple first, so two flows can never share it
        let claimed = match self.by_v4.entry(session.outer) {
            Entry::Occupied(owner) if *owner.get() == session.inner => false,
            Entry::Occupied(_) => return Err(SessionError::OuterTupleTaken(session.outer)),
            Entry::Vacant(slot) => {
                slot.insert(session.inner);
                true
            }
        };

        let existing = match self.by_v6.entry(session.inner) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(slot) => {
                slot.insert(session);
                log::debug!("New session {} <-> {}", session.inner, session.outer);
                return Ok((session, true));
            }
        };

        // Another packet of this flow got here first, possibly with another outer tuple
        if claimed && existing.outer != session.outer {
            self.by_v4
                .remove_if(&session.outer, |_, inner| *inner == session.inner);
        }
        Ok((existing, false))
    }

    /// Remove the session keyed by `inner`, returning it
    pub fn remove(&self, inner: &Tuple) -> Option<Session> {
        let (_, session) = self.by_v6.remove(inner)?;
        self.by_v4
            .remove_if(&session.outer, |_, owner| *owner == session.inner);
        log::debug!("Removed session {} <-> {}", session.inner, session.outer);
        Some(session)
    }

    /// Apply `update` to the session keyed by `inner`, returning the updated session
    pub fn update<F>(&self, inner: &Tuple, update: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = self.by_v6.get_mut(inner)?;
        update(&mut *session);
        Some(*session)
    }

    /// Remove every session that expired before `now`. Returns the number of removed sessions
    pub fn prune(&self, now: Instant) -> usize {
        log::trace!("Pruning expired sessions");

        let mut removed = Vec::new();
        self.by_v6.retain(|_, session| {
            let keep = session.expires > now;
            if !keep {
                log::trace!(
                    "Session {} <-> {} has timed out and will be removed",
                    session.inner,
                    session.outer
                );
                removed.push(*session);
            }
            keep
        });

        for session in &removed {
            self.by_v4
                .remove_if(&session.outer, |_, inner| *inner == session.inner);
        }
        removed.len()
    }

    /// Collect the IPv6 endpoints that still have at least one live session
    #[must_use]
    pub fn bound_endpoints(&self) -> FxHashSet<(L4Proto, SocketAddrV6)> {
        self.by_v6
            .iter()
            .filter_map(|session| session.bound_endpoint())
            .collect()
    }

    /// Get the number of sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_v6.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_v6.is_empty()
    }
}
