use std::net::{SocketAddrV4, SocketAddrV6};

use crate::{L4Proto, Tuple};

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum TupleError {
    #[error("Source and destination of a tuple must share an address family")]
    MismatchedAddressFamily,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum BindingError {
    #[error("IPv4 pool exhausted. No free {0} transport address left to bind")]
    Exhausted(L4Proto),
    #[error("{0} is already bound to another IPv6 endpoint")]
    AddressAlreadyBound(SocketAddrV4),
    #[error("{0} is already bound to another IPv4 endpoint")]
    EndpointAlreadyBound(SocketAddrV6),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum SessionError {
    #[error("{0} already belongs to another session")]
    OuterTupleTaken(Tuple),
}
