//! Error Module - Carving and Platform-Backing Errors
//!
//! These are internal to the crate: every public façade operation still
//! returns `Option`/unit per the documented contract, converting an
//! `AllocError` to `None` at the boundary. Kept as a proper `thiserror` enum
//! (rather than a `bool`) so the internal carving/init code paths can use
//! `?` instead of manual unwrap chains.

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AllocError {
    #[error("region too small to hold the control block and a minimum-sized heap")]
    RegionTooSmall,

    #[error("platform allocation of {requested} bytes failed")]
    PlatformAllocationFailed { requested: usize },

    #[error("layout for {requested} bytes at {align}-byte alignment is invalid")]
    InvalidLayout { requested: usize, align: usize },
}

pub(crate) type Result<T> = std::result::Result<T, AllocError>;
