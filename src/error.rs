//! Error types shared by the queued writes module and the link context registry

use crate::stack::StackError;

/// SDK error codes returned by [`Error::code`]
pub mod code {
    pub const NO_MEM: u32 = 4;
    pub const NOT_FOUND: u32 = 5;
    pub const INVALID_PARAM: u32 = 7;
    pub const INVALID_STATE: u32 = 8;
    pub const NULL: u32 = 14;
    pub const BUSY: u32 = 17;
}

/// Errors reported by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A required input was missing
    Null,
    /// Called before init, or init called twice
    InvalidState,
    /// A fixed-capacity table or buffer is exhausted
    NoMemory,
    /// Lookup miss (unregistered handle, unknown connection)
    NotFound,
    /// Misaligned or inconsistent sizes
    InvalidParameter,
    /// Error returned by the underlying stack, passed through unchanged
    Stack(StackError),
}

impl Error {
    /// Numeric SDK error code
    pub fn code(&self) -> u32 {
        match self {
            Error::Null => code::NULL,
            Error::InvalidState => code::INVALID_STATE,
            Error::NoMemory => code::NO_MEM,
            Error::NotFound => code::NOT_FOUND,
            Error::InvalidParameter => code::INVALID_PARAM,
            Error::Stack(e) => e.0,
        }
    }
}

impl From<StackError> for Error {
    fn from(e: StackError) -> Self {
        Error::Stack(e)
    }
}
