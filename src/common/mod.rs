//! Common code used by the xlat64 binary

pub mod logging;
pub mod profiler;
pub mod replay;
