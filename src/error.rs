use bib::BindingError;

use crate::packet::PacketError;

/// What the translator decided to do with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The packet went all the way through the pipeline and was handed to the sender
    Continue,
    /// The packet is none of our business. The host should handle it as usual
    Accept,
    /// The packet must be silently discarded
    Drop,
}

/// Fatal packet-path errors. These abort the current packet only
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error("Inconsistent translator state: {0}")]
    Inconsistent(String),
}

/// Why a pipeline stopped before reaching the end
#[derive(Debug)]
pub enum Halt {
    Accept,
    Drop,
    Fatal(Error),
}

/// The result of one pipeline stage. `?` short-circuits on any [`Halt`]
pub type Step<T> = Result<T, Halt>;

impl From<Error> for Halt {
    fn from(error: Error) -> Self {
        Self::Fatal(error)
    }
}

impl From<PacketError> for Halt {
    fn from(error: PacketError) -> Self {
        Self::Fatal(error.into())
    }
}

impl From<Halt> for Verdict {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Accept => Self::Accept,
            Halt::Drop => Self::Drop,
            Halt::Fatal(error) => {
                log::error!("Dropping packet after a fatal error: {}", error);
                Self::Drop
            }
        }
    }
}

impl From<Step<()>> for Verdict {
    fn from(step: Step<()>) -> Self {
        match step {
            Ok(()) => Self::Continue,
            Err(halt) => halt.into(),
        }
    }
}
