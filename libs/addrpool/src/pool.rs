use std::{net::Ipv4Addr, sync::Arc};

use ipnet::Ipv4Net;
use parking_lot::{Mutex, RwLock};

use crate::error::{ConfigError, PoolError};

/// Prefixes shorter than this can only be added with `force`
pub const MIN_UNFORCED_PREFIX_LEN: u8 = 16;

/// Tells `Pool::for_each` what to do after visiting an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep walking
    Continue,
    /// Stop the walk here
    Stop,
}

/// How a `Pool::for_each` walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEach {
    /// Every remaining entry was visited
    Done,
    /// The visitor stopped early and there are entries left to visit
    Pending,
}

/// A set of IPv4 prefixes with lock-free-ish reads and serialized writes.
///
/// Entries are kept sorted (by network address, then prefix length) inside an immutable
/// snapshot. Writers build a new snapshot and swap it in, so readers never see a half-applied
/// change.
#[derive(Debug)]
pub struct Pool {
    /// The currently published entries
    entries: RwLock<Arc<[Ipv4Net]>>,
    /// Held for the whole duration of a mutation
    writer: Mutex<()>,
}

impl Pool {
    /// Construct a new empty `Pool`
    #[must_use]
    pub fn new() -> Self {
        Self::from_prefixes(Vec::new())
    }

    /// Build a pool from prefix strings such as `"192.0.2.0/24"`.
    ///
    /// Duplicates are silently merged.
    pub fn init<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, ConfigError> {
        let parsed = prefixes
            .iter()
            .map(|prefix| {
                let prefix = prefix.as_ref();
                prefix
                    .trim()
                    .parse::<Ipv4Net>()
                    .map_err(|_| ConfigError::MalformedPrefix(prefix.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_prefixes(parsed))
    }

    /// Build a pool from already-parsed prefixes. Duplicates are silently merged.
    #[must_use]
    pub fn from_prefixes<I: IntoIterator<Item = Ipv4Net>>(prefixes: I) -> Self {
        let mut entries: Vec<Ipv4Net> = prefixes.into_iter().map(|prefix| prefix.trunc()).collect();
        entries.sort_unstable();
        entries.dedup();

        Self {
            entries: RwLock::new(entries.into()),
            writer: Mutex::new(()),
        }
    }

    /// Get the current snapshot of the pool
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Ipv4Net]> {
        self.entries.read().clone()
    }

    /// Replace the published snapshot
    fn publish(&self, entries: Vec<Ipv4Net>) {
        *self.entries.write() = entries.into();
    }

    /// Add a prefix to the pool.
    ///
    /// Exact duplicates are always rejected. Without `force`, prefixes that overlap an existing
    /// entry or are shorter than [`MIN_UNFORCED_PREFIX_LEN`] are rejected as well.
    pub fn add(&self, prefix: Ipv4Net, force: bool) -> Result<(), PoolError> {
        let prefix = prefix.trunc();
        let _guard = self.writer.lock();
        let current = self.snapshot();

        // Figure out where the new entry belongs
        let index = match current.binary_search(&prefix) {
            Ok(_) => return Err(PoolError::DuplicateEntry(prefix)),
            Err(index) => index,
        };

        if !force {
            if prefix.prefix_len() < MIN_UNFORCED_PREFIX_LEN {
                return Err(PoolError::InvalidArgument(format!(
                    "{prefix} spans too many addresses. Use force to add it anyway"
                )));
            }
            if let Some(existing) = current.iter().find(|entry| overlaps(entry, &prefix)) {
                return Err(PoolError::InvalidArgument(format!(
                    "{prefix} overlaps with {existing}. Use force to add it anyway"
                )));
            }
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend_from_slice(&current[..index]);
        next.push(prefix);
        next.extend_from_slice(&current[index..]);
        self.publish(next);

        log::debug!("Added {} to the pool", prefix);
        Ok(())
    }

    /// Remove an exact prefix from the pool
    pub fn remove(&self, prefix: Ipv4Net) -> Result<(), PoolError> {
        let prefix = prefix.trunc();
        let _guard = self.writer.lock();
        let current = self.snapshot();

        let index = current
            .binary_search(&prefix)
            .map_err(|_| PoolError::NotFound(prefix))?;

        let mut next = current.to_vec();
        next.remove(index);
        self.publish(next);

        log::debug!("Removed {} from the pool", prefix);
        Ok(())
    }

    /// Remove every prefix from the pool
    pub fn flush(&self) {
        let _guard = self.writer.lock();
        self.publish(Vec::new());
        log::debug!("Flushed the pool");
    }

    /// Check if any entry covers the given address
    #[must_use]
    #[profiling::function]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.snapshot().iter().any(|entry| entry.contains(&addr))
    }

    /// Walk the entries that sort strictly after `offset` (or all of them if `offset` is `None`).
    ///
    /// `offset` is meant to be the last entry a previous walk saw. It does not need to still be
    /// part of the pool. The walk operates on a single snapshot.
    pub fn for_each<F, E>(&self, offset: Option<&Ipv4Net>, mut visitor: F) -> Result<ForEach, E>
    where
        F: FnMut(&Ipv4Net) -> Result<Visit, E>,
    {
        let snapshot = self.snapshot();
        let start = match offset {
            Some(offset) => match snapshot.binary_search(offset) {
                Ok(index) => index + 1,
                Err(index) => index,
            },
            None => 0,
        };

        let mut remaining = snapshot[start..].iter();
        for entry in remaining.by_ref() {
            if visitor(entry)? == Visit::Stop {
                break;
            }
        }

        if remaining.as_slice().is_empty() {
            return Ok(ForEach::Done);
        }
        Ok(ForEach::Pending)
    }

    /// Get the number of prefixes in the pool
    #[must_use]
    pub fn count(&self) -> u64 {
        u64::try_from(self.snapshot().len()).unwrap_or(u64::MAX)
    }

    /// Check if the pool has no prefixes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if two prefixes share at least one address
fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn net(prefix: &str) -> Ipv4Net {
        prefix.parse().unwrap()
    }

    #[test]
    fn test_init() {
        let pool = Pool::init(&["198.51.100.0/24", "192.0.2.0/24", "192.0.2.0/24"]).unwrap();
        assert_eq!(pool.count(), 2);
        assert_eq!(
            pool.snapshot().to_vec(),
            vec![net("192.0.2.0/24"), net("198.51.100.0/24")]
        );
    }

    #[test]
    fn test_init_malformed() {
        assert_eq!(
            Pool::init(&["192.0.2.0/33"]).unwrap_err(),
            ConfigError::MalformedPrefix("192.0.2.0/33".to_string())
        );
        assert!(Pool::init(&["192.0.2.300/24"]).is_err());
        assert!(Pool::init(&["not a prefix"]).is_err());
    }

    #[test]
    fn test_contains() {
        let pool = Pool::init(&["198.51.100.0/24"]).unwrap();
        assert!(pool.contains("198.51.100.5".parse().unwrap()));
        assert!(!pool.contains("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn test_add_remove_restores_containment() {
        let pool = Pool::init(&["192.0.2.0/24"]).unwrap();
        let addr = "198.51.100.77".parse().unwrap();
        assert!(!pool.contains(addr));

        pool.add(net("198.51.100.0/24"), false).unwrap();
        assert!(pool.contains(addr));

        pool.remove(net("198.51.100.0/24")).unwrap();
        assert!(!pool.contains(addr));
        assert!(pool.contains("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_add_rejections() {
        let pool = Pool::init(&["192.0.2.0/24"]).unwrap();

        assert_eq!(
            pool.add(net("192.0.2.0/24"), false),
            Err(PoolError::DuplicateEntry(net("192.0.2.0/24")))
        );
        assert!(matches!(
            pool.add(net("192.0.2.128/25"), false),
            Err(PoolError::InvalidArgument(_))
        ));
        assert!(matches!(
            pool.add(net("10.0.0.0/8"), false),
            Err(PoolError::InvalidArgument(_))
        ));

        // Failed adds must not leave anything behind
        assert_eq!(pool.snapshot().to_vec(), vec![net("192.0.2.0/24")]);

        // Force lets both through, but never duplicates
        pool.add(net("192.0.2.128/25"), true).unwrap();
        pool.add(net("10.0.0.0/8"), true).unwrap();
        assert_eq!(pool.count(), 3);
        assert_eq!(
            pool.add(net("10.0.0.0/8"), true),
            Err(PoolError::DuplicateEntry(net("10.0.0.0/8")))
        );
    }

    #[test]
    fn test_remove_not_found() {
        let pool = Pool::init(&["192.0.2.0/24"]).unwrap();
        assert_eq!(
            pool.remove(net("192.0.2.0/25")),
            Err(PoolError::NotFound(net("192.0.2.0/25")))
        );
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_flush() {
        let pool = Pool::init(&["192.0.2.0/24", "198.51.100.0/24"]).unwrap();
        pool.flush();
        assert!(pool.is_empty());
        assert_eq!(pool.count(), 0);
        assert!(!pool.contains("192.0.2.1".parse().unwrap()));
        assert!(!pool.contains("198.51.100.1".parse().unwrap()));
    }

    #[test]
    fn test_for_each_pages() {
        let pool = Pool::from_prefixes(
            (0..1000u32).map(|i| Ipv4Net::new(Ipv4Addr::from(0x0a00_0000 + (i << 8)), 24).unwrap()),
        );
        assert_eq!(pool.count(), 1000);

        let mut offset = None;
        let mut pages = Vec::new();
        loop {
            let mut page = Vec::new();
            let result = pool
                .for_each(offset.as_ref(), |entry| {
                    page.push(*entry);
                    Ok::<_, Infallible>(match page.len() {
                        50 => Visit::Stop,
                        _ => Visit::Continue,
                    })
                })
                .unwrap();
            offset = page.last().copied();
            pages.push((page, result));
            if result == ForEach::Done {
                break;
            }
        }

        assert_eq!(pages.len(), 20);
        assert_eq!(pages.first().unwrap().1, ForEach::Pending);
        assert_eq!(pages.last().unwrap().1, ForEach::Done);
        assert!(pages.iter().all(|(page, _)| page.len() == 50));

        // Every entry shows up exactly once, in order
        let seen: Vec<Ipv4Net> = pages.into_iter().flat_map(|(page, _)| page).collect();
        assert_eq!(seen, pool.snapshot().to_vec());
    }

    #[test]
    fn test_for_each_removed_offset() {
        let pool = Pool::init(&["192.0.2.0/24", "198.51.100.0/24", "203.0.113.0/24"]).unwrap();
        pool.remove(net("198.51.100.0/24")).unwrap();

        let mut seen = Vec::new();
        pool.for_each(Some(&net("198.51.100.0/24")), |entry| {
            seen.push(*entry);
            Ok::<_, Infallible>(Visit::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec![net("203.0.113.0/24")]);
    }

    #[test]
    fn test_for_each_visitor_error() {
        let pool = Pool::init(&["192.0.2.0/24"]).unwrap();
        assert_eq!(pool.for_each(None, |_| Err("boom")), Err("boom"));
    }

    #[test]
    fn test_concurrent_readers_during_writes() {
        let pool = Pool::init(&["192.0.2.0/24"]).unwrap();
        let stable = "192.0.2.1".parse().unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        assert!(pool.contains(stable));
                        let snapshot = pool.snapshot();
                        assert!(snapshot.windows(2).all(|pair| pair[0] < pair[1]));
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..200u32 {
                    let prefix = Ipv4Net::new(Ipv4Addr::from(0x0a00_0000 + (i << 8)), 24).unwrap();
                    pool.add(prefix, false).unwrap();
                    pool.remove(prefix).unwrap();
                }
            });
        });

        assert_eq!(pool.count(), 1);
    }
}
