//! Errors that can happen while configuring or running a simulation

use crate::pipeline::Kernel;

/// Everything that can go wrong before the GPU API gets involved.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The simulation was given no particles
    #[error("A simulation needs at least one particle")]
    NoParticles,
    /// So many particles that the radix sort's global scan can't cover them in one workgroup
    #[error("{count} particles requested, there must be fewer than {max}")]
    TooManyParticles {
        /// Requested count
        count: usize,
        /// Exclusive upper limit
        max: u32,
    },
    /// Slots can't be rotated with fewer than 2 frames in flight
    #[error("At least 2 frames in flight are needed, {requested} requested")]
    FramesInFlight {
        /// Requested frames in flight
        requested: usize,
    },
    /// A configuration value is out of range
    #[error("Invalid `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending field
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
    /// A dispatch doesn't launch enough invocations for the work it has to do
    #[error("The {kernel:?} dispatch covers {covered} invocations but needs {required}")]
    DispatchMismatch {
        /// The kernel being dispatched
        kernel: Kernel,
        /// Invocations launched
        covered: u64,
        /// Invocations needed
        required: u64,
    },
    /// A device failed outside of the GPU API, naming the step that failed
    #[error("Device failure while {step}: {reason}")]
    Device {
        /// What the device was doing
        step: &'static str,
        /// Details
        reason: String,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
