//! BLE stack trait for abstraction and testability
//!
//! This trait defines the calls the queued writes module makes into the
//! underlying stack, allowing the vendor stack to be swapped with a mock for
//! testing.

use crate::error::code;
use crate::gatt::{AttrHandle, ConnHandle, GattStatus};

/// Error code returned by the stack
///
/// Opaque: codes are passed through to the application without being
/// reinterpreted. Only [`StackError::BUSY`] triggers a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackError(pub u32);

impl StackError {
    /// Transient: the stack is out of resources, retry on `ResourcesAvailable`
    pub const BUSY: Self = Self(code::BUSY);

    pub fn is_busy(&self) -> bool {
        *self == Self::BUSY
    }
}

/// Outbound calls into the BLE stack
pub trait BleStack {
    /// Copy the current value of an attribute into `out`
    ///
    /// Returns the number of bytes copied.
    fn attr_value_get(
        &mut self,
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        out: &mut [u8],
    ) -> Result<usize, StackError>;

    /// Replace the value of an attribute
    fn attr_value_set(
        &mut self,
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        value: &[u8],
    ) -> Result<(), StackError>;

    /// Answer a user memory request
    ///
    /// `Some(len)` supplies a staging block of `len` bytes, `None` declines and
    /// lets the stack reject long writes at the protocol level.
    fn user_mem_reply(
        &mut self,
        conn_handle: ConnHandle,
        block_len: Option<usize>,
    ) -> Result<(), StackError>;

    /// Hand the staging block back once a queued write cycle is over
    fn user_mem_release(&mut self, conn_handle: ConnHandle) -> Result<(), StackError>;

    /// Answer a prepare write or execute write authorization request
    fn authorize_reply(
        &mut self,
        conn_handle: ConnHandle,
        status: GattStatus,
    ) -> Result<(), StackError>;
}
