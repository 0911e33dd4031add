use std::{
    net::{SocketAddrV4, SocketAddrV6},
    time::Instant,
};

use dashmap::{mapref::entry::Entry, DashMap};
use rustc_hash::FxHashSet;

use crate::{BindingError, L4Proto};

/// How long a binding lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Configured by the administrator. Never expires
    Static,
    /// Expires at the given instant unless refreshed
    Until(Instant),
}

/// An IPv6 transport endpoint and the IPv4 transport endpoint it is known as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub l4: L4Proto,
    pub v6: SocketAddrV6,
    pub v4: SocketAddrV4,
    pub lifetime: Lifetime,
}

impl Binding {
    /// Check if this binding has expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.lifetime {
            Lifetime::Static => false,
            Lifetime::Until(expires) => expires <= now,
        }
    }
}

/// The Binding Information Base.
///
/// `by_v6` owns the bindings. `by_v4` is an index into it, and is also used to reserve IPv4
/// endpoints while a binding is being created. No operation holds a guard on one map while
/// touching the other.
#[derive(Debug, Default)]
pub struct BindingTable {
    by_v6: DashMap<(L4Proto, SocketAddrV6), Binding>,
    by_v4: DashMap<(L4Proto, SocketAddrV4), SocketAddrV6>,
}

impl BindingTable {
    /// Construct a new empty `BindingTable`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the binding owned by an IPv6 endpoint
    #[must_use]
    #[profiling::function]
    pub fn get_by_v6(&self, l4: L4Proto, v6: SocketAddrV6) -> Option<Binding> {
        self.by_v6.get(&(l4, v6)).map(|binding| *binding)
    }

    /// Get the binding that owns an IPv4 endpoint
    #[must_use]
    #[profiling::function]
    pub fn get_by_v4(&self, l4: L4Proto, v4: SocketAddrV4) -> Option<Binding> {
        let v6 = *self.by_v4.get(&(l4, v4))?;
        self.get_by_v6(l4, v6).filter(|binding| binding.v4 == v4)
    }

    /// Add a binding that never expires
    pub fn insert_static(
        &self,
        l4: L4Proto,
        v6: SocketAddrV6,
        v4: SocketAddrV4,
    ) -> Result<Binding, BindingError> {
        // Claim the IPv4 side first
        let reserved = match self.by_v4.entry((l4, v4)) {
            Entry::Occupied(owner) if *owner.get() == v6 => false,
            Entry::Occupied(_) => return Err(BindingError::AddressAlreadyBound(v4)),
            Entry::Vacant(slot) => {
                slot.insert(v6);
                true
            }
        };

        let binding = Binding {
            l4,
            v6,
            v4,
            lifetime: Lifetime::Static,
        };
        let result = match self.by_v6.entry((l4, v6)) {
            Entry::Occupied(mut existing) if existing.get().v4 == v4 => {
                existing.get_mut().lifetime = Lifetime::Static;
                Ok(binding)
            }
            Entry::Occupied(_) => Err(BindingError::EndpointAlreadyBound(v6)),
            Entry::Vacant(slot) => {
                slot.insert(binding);
                Ok(binding)
            }
        };

        if result.is_err() && reserved {
            self.by_v4.remove_if(&(l4, v4), |_, owner| *owner == v6);
        }
        if result.is_ok() {
            log::debug!("Added static {} binding {} <-> {}", l4, v6, v4);
        }
        result
    }

    /// Get the binding owned by `v6`, creating one from the first free candidate if there is none.
    ///
    /// When several threads race to bind the same endpoint, exactly one binding survives and every
    /// caller gets it back.
    #[profiling::function]
    pub fn get_or_bind<I>(
        &self,
        l4: L4Proto,
        v6: SocketAddrV6,
        candidates: I,
        expires: Instant,
    ) -> Result<Binding, BindingError>
    where
        I: IntoIterator<Item = SocketAddrV4>,
    {
        if let Some(binding) = self.get_by_v6(l4, v6) {
            return Ok(binding);
        }

        for candidate in candidates {
            // Reserve the IPv4 endpoint so nobody else can hand it out
            match self.by_v4.entry((l4, candidate)) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(v6);
                }
            }

            let binding = Binding {
                l4,
                v6,
                v4: candidate,
                lifetime: Lifetime::Until(expires),
            };
            let winner = match self.by_v6.entry((l4, v6)) {
                Entry::Occupied(existing) => *existing.get(),
                Entry::Vacant(slot) => {
                    slot.insert(binding);
                    log::debug!("Bound {} {} to {}", l4, v6, candidate);
                    return Ok(binding);
                }
            };

            // Somebody else bound this endpoint first. Give back our reservation
            self.by_v4.remove_if(&(l4, candidate), |_, owner| *owner == v6);
            return Ok(winner);
        }

        Err(BindingError::Exhausted(l4))
    }

    /// Push back the expiry of a dynamic binding. Expiry never moves backwards.
    ///
    /// Returns the refreshed binding, or `None` if `v6` is not bound (anymore).
    pub fn refresh(&self, l4: L4Proto, v6: SocketAddrV6, expires: Instant) -> Option<Binding> {
        let mut binding = self.by_v6.get_mut(&(l4, v6))?;
        if let Lifetime::Until(current) = binding.lifetime {
            binding.lifetime = Lifetime::Until(current.max(expires));
        }
        Some(*binding)
    }

    /// Remove every dynamic binding that expired before `now` and is not in `in_use`.
    ///
    /// Returns the number of removed bindings.
    pub fn prune(&self, now: Instant, in_use: &FxHashSet<(L4Proto, SocketAddrV6)>) -> usize {
        log::trace!("Pruning expired bindings");

        let mut removed = Vec::new();
        self.by_v6.retain(|key, binding| {
            let keep = !binding.is_expired(now) || in_use.contains(key);
            if !keep {
                log::trace!(
                    "Binding {} <-> {} has timed out and will be removed",
                    binding.v6,
                    binding.v4
                );
                removed.push(*binding);
            }
            keep
        });

        for binding in &removed {
            self.by_v4
                .remove_if(&(binding.l4, binding.v4), |_, owner| *owner == binding.v6);
        }
        removed.len()
    }

    /// Get the number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_v6.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_v6.is_empty()
    }
}
