//! One queued writes instance per link
//!
//! Instances live in the link context registry, indexed by the dense
//! connection index of the link they serve.

use crate::config::conn_state::MAX_CONNECTIONS;
use crate::config::qwr::MAX_ATTR;
use crate::conn_state::ConnIndex;
use crate::error::Error;
use crate::gatt::{ConnHandle, GattStatus};
use crate::link_ctx::LinkContexts;
use crate::qwr::coordinator::QueuedWrites;
use crate::qwr::handler::QwrHandler;
use crate::stack::{BleStack, StackEvent};
use log::{debug, warn};

/// Queued writes instances indexed by dense connection index
pub struct QwrPool<'a, H, const N: usize = MAX_ATTR, const L: usize = MAX_CONNECTIONS> {
    instances: LinkContexts<QueuedWrites<'a, H, N>, L>,
}

impl<'a, H: QwrHandler, const N: usize, const L: usize> QwrPool<'a, H, N, L> {
    /// Pool of uninitialised instances. Each one must be initialised through
    /// [`QwrPool::instance_mut`] before it takes part in event handling.
    pub fn new() -> Self {
        Self {
            instances: LinkContexts::from_fn(|_| QueuedWrites::new()),
        }
    }

    pub fn instance(&self, index: usize) -> Option<&QueuedWrites<'a, H, N>> {
        self.instances.slot(index)
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut QueuedWrites<'a, H, N>> {
        self.instances.slot_mut(index)
    }

    /// Instance serving `conn_handle`
    pub fn get<R: ConnIndex + ?Sized>(
        &mut self,
        resolver: &R,
        conn_handle: ConnHandle,
    ) -> Result<&mut QueuedWrites<'a, H, N>, Error> {
        self.instances.get(resolver, conn_handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedWrites<'a, H, N>> {
        self.instances.iter()
    }

    /// Route a stack event to the instance of its link
    ///
    /// `resolver` must already know about a link whose `Connected` event is
    /// being delivered.
    pub fn on_ble_evt<S: BleStack, R: ConnIndex + ?Sized>(
        &mut self,
        stack: &mut S,
        resolver: &R,
        event: &StackEvent,
    ) -> Option<GattStatus> {
        match event {
            StackEvent::Connected { conn_handle } => {
                self.on_connect(resolver, *conn_handle);
                None
            }
            StackEvent::ResourcesAvailable => {
                for qwr in self.instances.iter_mut() {
                    qwr.on_ble_evt(stack, event);
                }
                None
            }
            _ => {
                let conn_handle = event.conn_handle()?;
                match self.instances.get(resolver, conn_handle) {
                    Ok(qwr) => qwr.on_ble_evt(stack, event),
                    Err(e) => {
                        debug!("qwr pool: no instance for link {:#06x}: {:?}", conn_handle, e);
                        None
                    }
                }
            }
        }
    }

    fn on_connect<R: ConnIndex + ?Sized>(&mut self, resolver: &R, conn_handle: ConnHandle) {
        let qwr = match self.instances.get(resolver, conn_handle) {
            Ok(qwr) => qwr,
            Err(e) => {
                warn!(
                    "qwr pool: link {:#06x} has no queued writes instance: {:?}",
                    conn_handle, e
                );
                return;
            }
        };

        if !qwr.is_initialized() {
            warn!("qwr pool: instance for link {:#06x} not initialised", conn_handle);
            return;
        }
        // Only fails before init
        let _ = qwr.conn_handle_assign(conn_handle);
    }
}

impl<'a, H: QwrHandler, const N: usize, const L: usize> Default for QwrPool<'a, H, N, L> {
    fn default() -> Self {
        Self::new()
    }
}
