//! # xlat64
//!
//! The session and tuple core of a stateful NAT64 (RFC 6146).
//!
//! An [`Xlator`] owns everything a translator instance needs: its configuration, pool4, the
//! binding and session tables, and the collaborators that rewrite packet bodies and send them
//! out. Packets enter through [`Xlator::process`] and leave through a [`send::PacketSender`].
//!
//! *Note: There is a fair chance you are looking for `src/xlat64.rs` instead of this file.*

#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod admin;
pub mod config;
mod error;
#[cfg(feature = "metrics")]
mod metrics;
pub mod packet;
pub mod pool4;
pub mod rfc6052;
pub mod send;
pub mod stateful;
pub mod xlat;
mod xlator;

#[cfg(test)]
mod testing;

pub use bib::{L3Proto, L4Proto, Tuple};
pub use error::{Error, Halt, Step, Verdict};
pub use xlator::{SweepStats, Xlator};
