//! Error types for this library

use ipnet::Ipv4Net;

/// Errors returned by administrative pool operations
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Prefix {0} is already part of the pool")]
    DuplicateEntry(Ipv4Net),
    #[error("Prefix {0} is not part of the pool")]
    NotFound(Ipv4Net),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Errors thrown while building a pool from configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Malformed IPv4 prefix: {0:?}")]
    MalformedPrefix(String),
}
