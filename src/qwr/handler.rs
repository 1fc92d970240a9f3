//! Application callback interface of the queued writes module

use crate::error::Error;
use crate::gatt::{AttrHandle, GattStatus};

/// Queued writes event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QwrEventType {
    /// Data for the attribute was written and is now ready
    ExecuteWrite,
    /// An execute write touches the attribute and must be accepted or rejected
    AuthRequest,
}

/// Event passed to [`QwrHandler::on_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QwrEvent {
    pub evt_type: QwrEventType,
    pub attr_handle: AttrHandle,
}

impl QwrEvent {
    pub fn auth_request(attr_handle: AttrHandle) -> Self {
        Self {
            evt_type: QwrEventType::AuthRequest,
            attr_handle,
        }
    }

    pub fn execute_write(attr_handle: AttrHandle) -> Self {
        Self {
            evt_type: QwrEventType::ExecuteWrite,
            attr_handle,
        }
    }
}

/// Owner of the registered attributes
pub trait QwrHandler {
    /// Handle an event for a registered attribute
    ///
    /// For [`QwrEventType::AuthRequest`] the returned status accepts
    /// ([`GattStatus::SUCCESS`]) or rejects the execute write. It is ignored
    /// for [`QwrEventType::ExecuteWrite`].
    fn on_event(&mut self, event: &QwrEvent) -> GattStatus;

    /// Errors that cannot be returned to the stack, e.g. a failure applying
    /// data after the execute write was authorized
    fn on_error(&mut self, error: Error);
}

#[cfg(test)]
pub mod mock {
    //! Recording handler for testing

    use super::*;
    use heapless::Vec;

    /// Records every callback and rejects configured handles
    #[derive(Default)]
    pub struct RecordingHandler {
        events: Vec<QwrEvent, 32>,
        errors: Vec<Error, 8>,
        rejections: Vec<(AttrHandle, GattStatus), 4>,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer auth requests for `attr_handle` with `status`
        pub fn reject(mut self, attr_handle: AttrHandle, status: GattStatus) -> Self {
            self.rejections.push((attr_handle, status)).unwrap();
            self
        }

        pub fn events(&self) -> &[QwrEvent] {
            &self.events
        }

        /// Handles of recorded events of one type, in callback order
        pub fn handles(&self, evt_type: QwrEventType) -> Vec<AttrHandle, 32> {
            self.events
                .iter()
                .filter(|e| e.evt_type == evt_type)
                .map(|e| e.attr_handle)
                .collect()
        }

        pub fn errors(&self) -> &[Error] {
            &self.errors
        }
    }

    impl QwrHandler for RecordingHandler {
        fn on_event(&mut self, event: &QwrEvent) -> GattStatus {
            self.events.push(*event).unwrap();

            if event.evt_type != QwrEventType::AuthRequest {
                return GattStatus::SUCCESS;
            }
            self.rejections
                .iter()
                .find(|(h, _)| *h == event.attr_handle)
                .map(|(_, status)| *status)
                .unwrap_or(GattStatus::SUCCESS)
        }

        fn on_error(&mut self, error: Error) {
            self.errors.push(error).unwrap();
        }
    }
}
