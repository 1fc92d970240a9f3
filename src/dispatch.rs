//! Stack event delivery
//!
//! The stack's event handler posts [`StackEvent`]s into [`STACK_EVENTS`]. A
//! single consumer task drains the queue through an [`EventDispatcher`], which
//! keeps the connection tracker current, hands each event to the queued
//! writes pool and forwards authorize replies back to the stack.

use crate::config::conn_state::MAX_CONNECTIONS;
use crate::config::dispatch::EVENT_QUEUE_LEN;
use crate::config::qwr::MAX_ATTR;
use crate::conn_state::ConnState;
use crate::error::Error;
use crate::gatt::GattStatus;
use crate::qwr::{QwrHandler, QwrPool};
use crate::stack::{BleStack, StackEvent};
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::{Channel, Receiver};
use log::{debug, warn};

/// Global queue of events coming from the stack
///
/// Multiple producers (stack event handler, radio interrupts).
/// Single consumer (dispatcher task).
pub static STACK_EVENTS: Channel<CriticalSectionRawMutex, StackEvent, EVENT_QUEUE_LEN> =
    Channel::new();

/// Type alias for the stack event receiver
pub type StackEventReceiver = Receiver<'static, CriticalSectionRawMutex, StackEvent, EVENT_QUEUE_LEN>;

/// Queue an event without blocking
///
/// Fails with [`Error::NoMemory`] when the queue is full. The event is dropped.
pub fn post_event(event: StackEvent) -> Result<(), Error> {
    STACK_EVENTS.try_send(event).map_err(|_| {
        warn!("dispatch: event queue full, dropping event");
        Error::NoMemory
    })
}

/// Delivers stack events to the queued writes pool
pub struct EventDispatcher<
    'a,
    H,
    const N: usize = MAX_ATTR,
    const C: usize = MAX_CONNECTIONS,
    const L: usize = MAX_CONNECTIONS,
> {
    conn_state: ConnState<C>,
    pool: QwrPool<'a, H, N, L>,
}

impl<'a, H: QwrHandler, const N: usize, const C: usize, const L: usize>
    EventDispatcher<'a, H, N, C, L>
{
    /// Create a dispatcher around an initialised pool
    pub fn new(pool: QwrPool<'a, H, N, L>) -> Self {
        Self {
            conn_state: ConnState::new(),
            pool,
        }
    }

    pub fn conn_state(&self) -> &ConnState<C> {
        &self.conn_state
    }

    pub fn pool(&self) -> &QwrPool<'a, H, N, L> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut QwrPool<'a, H, N, L> {
        &mut self.pool
    }

    /// Handle one stack event
    ///
    /// Returns the authorize reply sent to the stack, if any.
    pub fn dispatch<S: BleStack>(&mut self, stack: &mut S, event: &StackEvent) -> Option<GattStatus> {
        if let StackEvent::Connected { conn_handle } = event {
            if let Err(e) = self.conn_state.connect(*conn_handle) {
                warn!("dispatch: cannot track link {:#06x}: {:?}", conn_handle, e);
            }
        }

        let reply = self.pool.on_ble_evt(stack, &self.conn_state, event);

        if let (Some(status), Some(conn_handle)) = (reply, event.conn_handle()) {
            debug!("dispatch: authorize reply {:#06x} to link {:#06x}", status.0, conn_handle);
            if let Err(e) = stack.authorize_reply(conn_handle, status) {
                warn!("dispatch: authorize reply failed: {:?}", e);
            }
        }

        if let StackEvent::Disconnected { conn_handle, .. } = event {
            self.conn_state.disconnect(*conn_handle);
        }

        reply
    }

    /// Wait for the next queued event and handle it
    pub async fn process_next<S: BleStack, M: RawMutex, const Q: usize>(
        &mut self,
        stack: &mut S,
        receiver: &Receiver<'_, M, StackEvent, Q>,
    ) -> Option<GattStatus> {
        let event = receiver.receive().await;
        self.dispatch(stack, &event)
    }

    /// Dispatcher task loop
    pub async fn run<S: BleStack, M: RawMutex, const Q: usize>(
        &mut self,
        stack: &mut S,
        receiver: Receiver<'_, M, StackEvent, Q>,
    ) -> ! {
        loop {
            self.process_next(stack, &receiver).await;
        }
    }
}
