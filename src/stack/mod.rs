//! Boundary with the underlying BLE stack
//!
//! Inbound events the stack delivers and the outbound calls the queued writes
//! module issues back to it.

pub mod event;
pub mod traits;

pub use event::StackEvent;
pub use traits::{BleStack, StackError};
