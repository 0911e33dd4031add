//! Administrative access to the IPv4 prefix pools of a running translator

use addrpool::{ForEach, Pool, PoolError, Visit};
use bib::L4Proto;
use ipnet::Ipv4Net;

use crate::{config::Mode, Xlator};

/// Which of an instance's pools a request is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Stateful only
    Pool4(L4Proto),
    /// Stateless only
    Blacklist,
    /// Stateless only
    Pool6791,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolRequest {
    /// List one page of entries sorting after `offset`
    Foreach { offset: Option<Ipv4Net> },
    Add { prefix: Ipv4Net, force: bool },
    Remove { prefix: Ipv4Net },
    Flush,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolResponse {
    /// One page of entries. `pending` is set when more pages follow
    Prefixes { entries: Vec<Ipv4Net>, pending: bool },
    Done,
}

/// Find the pool a request targets, refusing pools the instance's mode does not use
fn target(x: &Xlator, kind: PoolKind) -> Result<&Pool, PoolError> {
    match (kind, x.config().mode) {
        (PoolKind::Pool4(l4), Mode::Stateful) => Ok(x.pool4().pool(l4)),
        (PoolKind::Blacklist, Mode::Stateless) => Ok(x.blacklist()),
        (PoolKind::Pool6791, Mode::Stateless) => Ok(x.pool6791()),
        (kind, mode) => Err(PoolError::InvalidOperation(format!(
            "{kind:?} is not available in {mode:?} mode"
        ))),
    }
}

/// Apply an administrative request to one of `x`'s pools
pub fn handle_pool_request(
    x: &Xlator,
    kind: PoolKind,
    request: PoolRequest,
) -> Result<PoolResponse, PoolError> {
    let pool = target(x, kind)?;
    log::debug!("Handling {:?} request for {:?}", request, kind);

    match request {
        PoolRequest::Foreach { offset } => {
            let page_size = x.config().max_entries_per_response;
            let mut entries = Vec::with_capacity(page_size);
            let walk = pool.for_each(offset.as_ref(), |entry| {
                entries.push(*entry);
                Ok::<_, PoolError>(if entries.len() >= page_size {
                    Visit::Stop
                } else {
                    Visit::Continue
                })
            })?;
            Ok(PoolResponse::Prefixes {
                entries,
                pending: walk == ForEach::Pending,
            })
        }
        PoolRequest::Add { prefix, force } => {
            pool.add(prefix, force)?;
            Ok(PoolResponse::Done)
        }
        PoolRequest::Remove { prefix } => {
            pool.remove(prefix)?;
            Ok(PoolResponse::Done)
        }
        PoolRequest::Flush => {
            pool.flush();
            Ok(PoolResponse::Done)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::net::Ipv4Addr;

    fn add(x: &Xlator, kind: PoolKind, prefix: &str) -> Result<PoolResponse, PoolError> {
        handle_pool_request(
            x,
            kind,
            PoolRequest::Add {
                prefix: prefix.parse().unwrap(),
                force: false,
            },
        )
    }

    #[test]
    fn test_foreach_pages() {
        let (x, _) = testing::xlator(testing::config(&[]));
        let kind = PoolKind::Pool4(L4Proto::Udp);
        for i in 0..1000u32 {
            let network = Ipv4Addr::from(0x0a00_0000 + (i << 8));
            let prefix = Ipv4Net::new(network, 24).unwrap();
            add(&x, kind, &prefix.to_string()).unwrap();
        }

        let mut pages = Vec::new();
        let mut offset = None;
        loop {
            let response =
                handle_pool_request(&x, kind, PoolRequest::Foreach { offset }).unwrap();
            let PoolResponse::Prefixes { entries, pending } = response else {
                panic!("Expected a page of prefixes");
            };
            offset = entries.last().copied();
            pages.push((entries.len(), pending));
            if !pending {
                break;
            }
        }

        assert_eq!(pages.len(), 20);
        assert!(pages.iter().all(|(len, _)| *len == 50));
        assert!(pages[..19].iter().all(|(_, pending)| *pending));
        assert!(!pages[19].1);
    }

    #[test]
    fn test_mutations_reach_the_packet_path() {
        let (x, _) = testing::xlator(testing::config(&[]));
        let kind = PoolKind::Pool4(L4Proto::Tcp);
        let inside = "192.0.2.7".parse().unwrap();

        assert_eq!(add(&x, kind, "192.0.2.0/24"), Ok(PoolResponse::Done));
        assert!(x.pool4().contains(L4Proto::Tcp, inside));
        assert!(!x.pool4().contains(L4Proto::Udp, inside));

        assert_eq!(
            add(&x, kind, "192.0.2.0/24"),
            Err(PoolError::DuplicateEntry("192.0.2.0/24".parse().unwrap()))
        );
        assert_eq!(
            handle_pool_request(
                &x,
                kind,
                PoolRequest::Remove {
                    prefix: "192.0.2.0/24".parse().unwrap()
                }
            ),
            Ok(PoolResponse::Done)
        );
        assert!(!x.pool4().contains(L4Proto::Tcp, inside));
        assert!(matches!(
            handle_pool_request(
                &x,
                kind,
                PoolRequest::Remove {
                    prefix: "192.0.2.0/24".parse().unwrap()
                }
            ),
            Err(PoolError::NotFound(_))
        ));

        add(&x, kind, "198.51.100.0/24").unwrap();
        assert_eq!(
            handle_pool_request(&x, kind, PoolRequest::Flush),
            Ok(PoolResponse::Done)
        );
        assert_eq!(x.pool4().size(L4Proto::Tcp), 0);
    }

    #[test]
    fn test_pools_follow_mode() {
        let (x, _) = testing::xlator(testing::config(&[]));
        assert!(matches!(
            add(&x, PoolKind::Blacklist, "192.0.2.0/24"),
            Err(PoolError::InvalidOperation(_))
        ));
        assert!(matches!(
            handle_pool_request(&x, PoolKind::Pool6791, PoolRequest::Flush),
            Err(PoolError::InvalidOperation(_))
        ));

        let mut config = testing::config(&[]);
        config.mode = Mode::Stateless;
        let (x, _) = testing::xlator(config);
        assert!(matches!(
            add(&x, PoolKind::Pool4(L4Proto::Icmp), "192.0.2.0/24"),
            Err(PoolError::InvalidOperation(_))
        ));
        assert_eq!(add(&x, PoolKind::Blacklist, "192.0.2.0/24"), Ok(PoolResponse::Done));
        assert!(x.blacklist().contains("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_empty_pool_is_a_single_page() {
        let (x, _) = testing::xlator(testing::config(&[]));
        assert_eq!(
            handle_pool_request(
                &x,
                PoolKind::Pool4(L4Proto::Udp),
                PoolRequest::Foreach { offset: None }
            ),
            Ok(PoolResponse::Prefixes {
                entries: Vec::new(),
                pending: false
            })
        );
    }
}
