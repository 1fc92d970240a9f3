//! Events delivered by the BLE stack

use crate::config::gatt::MAX_PREPARE_WRITE_LEN;
use crate::error::Error;
use crate::gatt::{AttrHandle, ConnHandle, ExecWriteFlag};
use heapless::Vec;

/// Event delivered by the stack's interrupt-deferred dispatch
///
/// Payloads are owned so events can be queued between the stack's handler and
/// the task that runs the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// A link was established
    Connected { conn_handle: ConnHandle },

    /// A link was lost
    Disconnected { conn_handle: ConnHandle, reason: u8 },

    /// Peer staged a value fragment for an attribute
    PrepareWrite {
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        offset: u16,
        data: Vec<u8, MAX_PREPARE_WRITE_LEN>,
    },

    /// Peer asked to commit or discard everything it staged
    ExecuteWrite {
        conn_handle: ConnHandle,
        flag: ExecWriteFlag,
    },

    /// Stack asks for a memory block to stage a long write
    UserMemoryRequest { conn_handle: ConnHandle },

    /// Stack no longer references the memory block
    UserMemoryRelease { conn_handle: ConnHandle },

    /// Stack has resources again after reporting busy
    ResourcesAvailable,
}

impl StackEvent {
    /// Build a prepare write event, copying `data`
    ///
    /// Fails with [`Error::NoMemory`] if `data` exceeds the largest prepare
    /// write payload.
    pub fn prepare_write(
        conn_handle: ConnHandle,
        attr_handle: AttrHandle,
        offset: u16,
        data: &[u8],
    ) -> Result<Self, Error> {
        let data = Vec::from_slice(data).map_err(|_| Error::NoMemory)?;
        Ok(StackEvent::PrepareWrite {
            conn_handle,
            attr_handle,
            offset,
            data,
        })
    }

    /// Connection the event relates to, if any
    pub fn conn_handle(&self) -> Option<ConnHandle> {
        match self {
            StackEvent::Connected { conn_handle }
            | StackEvent::Disconnected { conn_handle, .. }
            | StackEvent::PrepareWrite { conn_handle, .. }
            | StackEvent::ExecuteWrite { conn_handle, .. }
            | StackEvent::UserMemoryRequest { conn_handle }
            | StackEvent::UserMemoryRelease { conn_handle } => Some(*conn_handle),
            StackEvent::ResourcesAvailable => None,
        }
    }
}
