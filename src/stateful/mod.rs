//! The RFC 6146 session layer: filtering, tuple computation and hairpinning

mod filtering;
mod hairpin;
mod outgoing;

pub use filtering::filtering_and_updating;
pub use hairpin::{handling_hairpinning, is_hairpin};
pub use outgoing::compute_outgoing_tuple;
