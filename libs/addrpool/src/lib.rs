#![doc = include_str!("../README.md")]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod error;
mod pool;

pub use error::{ConfigError, PoolError};
pub use pool::{ForEach, Pool, Visit, MIN_UNFORCED_PREFIX_LEN};
