#![doc = include_str!("../README.md")]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod binding;
mod error;
mod session;
mod tuple;

pub use binding::{Binding, BindingTable, Lifetime};
pub use error::{BindingError, SessionError, TupleError};
pub use session::{Session, SessionState, SessionTable};
pub use tuple::{L3Proto, L4Proto, Tuple};
