//! Queued writes state machine
//!
//! Arbitrates GATT prepare write / execute write sequences for the attributes
//! registered with it. Prepared fragments are staged in the caller-supplied
//! memory buffer. On execute the application is asked to authorize each
//! write, the staged data is applied through the stack, and the application
//! is told which attributes changed.
//!
//! Every handler runs to completion. When the stack reports it is busy, the
//! step that failed is parked and resumed by the next `ResourcesAvailable`
//! event; nothing polls or blocks.

use crate::config::qwr::{MAX_ATTR, MAX_ATTR_VALUE_LEN};
use crate::error::Error;
use crate::gatt::{
    AttrHandle, ConnHandle, ExecWriteFlag, GattStatus, ATTR_HANDLE_INVALID, CONN_HANDLE_INVALID,
};
use crate::qwr::handler::{QwrEvent, QwrHandler};
use crate::qwr::queue::PrepareQueue;
use crate::stack::{BleStack, StackEvent};
use heapless::Vec;
use log::{debug, info, warn};

/// Initialization parameters
pub struct QwrInit<'a, H> {
    /// Receives authorization requests, write notifications and errors
    pub handler: Option<H>,
    /// Staging buffer for prepared writes, typically
    /// [`MEM_BUFFER_SIZE`](crate::config::qwr::MEM_BUFFER_SIZE) bytes.
    /// Required unless `N` is 0.
    pub mem_buffer: Option<&'a mut [u8]>,
}

/// Observable state of a queued writes instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QwrState {
    /// No link bound
    Unassigned,
    /// Bound, nothing staged
    Idle,
    /// Prepare writes received, waiting for execute
    Accumulating,
    /// Execute authorized, staged data being applied
    CommitPending,
    /// A memory reply or apply step is waiting for the stack to free resources
    MemoryReplyDeferred,
}

/// Progress through an authorized execute write
struct Commit<const N: usize> {
    /// Distinct written handles, in first-write order
    handles: Vec<AttrHandle, N>,
    /// Next handle to apply
    next: usize,
    /// Parked until the stack has resources again
    deferred: bool,
}

/// Queued writes instance
///
/// `N` bounds both the number of registered attributes and the number of
/// prepare writes accepted per execute cycle.
pub struct QueuedWrites<'a, H, const N: usize = MAX_ATTR> {
    initialized: bool,
    conn_handle: ConnHandle,
    handler: Option<H>,
    attr_handles: Vec<AttrHandle, N>,
    written: Vec<AttrHandle, N>,
    queue: Option<PrepareQueue<'a>>,
    block_supplied: bool,
    mem_reply_pending: bool,
    commit: Option<Commit<N>>,
}

impl<'a, H: QwrHandler, const N: usize> QueuedWrites<'a, H, N> {
    /// Create an uninitialised instance
    pub const fn new() -> Self {
        Self {
            initialized: false,
            conn_handle: CONN_HANDLE_INVALID,
            handler: None,
            attr_handles: Vec::new(),
            written: Vec::new(),
            queue: None,
            block_supplied: false,
            mem_reply_pending: false,
            commit: None,
        }
    }

    /// Initialise the instance. May only be called once.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if already initialised
    /// - [`Error::Null`] if the handler is missing, or the memory buffer is
    ///   missing while registration is enabled
    pub fn init(&mut self, init: QwrInit<'a, H>) -> Result<(), Error> {
        if self.initialized {
            return Err(Error::InvalidState);
        }

        let handler = init.handler.ok_or(Error::Null)?;
        let queue = match init.mem_buffer {
            Some(buf) => Some(PrepareQueue::new(buf)),
            None if N > 0 => return Err(Error::Null),
            None => None,
        };

        self.handler = Some(handler);
        self.queue = queue;
        self.conn_handle = CONN_HANDLE_INVALID;
        self.attr_handles.clear();
        self.block_supplied = false;
        self.mem_reply_pending = false;
        self.reset_cycle();
        self.initialized = true;
        Ok(())
    }

    /// Register an attribute for queued writes
    ///
    /// Registering a handle twice is accepted.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] before init
    /// - [`Error::InvalidParameter`] for the invalid attribute handle
    /// - [`Error::NoMemory`] if the registration table is full
    pub fn attr_register(&mut self, attr_handle: AttrHandle) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::InvalidState);
        }
        if attr_handle == ATTR_HANDLE_INVALID {
            return Err(Error::InvalidParameter);
        }
        if self.attr_handles.contains(&attr_handle) {
            return Ok(());
        }
        self.attr_handles
            .push(attr_handle)
            .map_err(|_| Error::NoMemory)
    }

    /// Associate the instance with a link, discarding any cycle in progress
    pub fn conn_handle_assign(&mut self, conn_handle: ConnHandle) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::InvalidState);
        }

        self.reset_cycle();
        self.block_supplied = false;
        self.mem_reply_pending = false;
        self.conn_handle = conn_handle;
        info!("qwr: bound to link {:#06x}", conn_handle);
        Ok(())
    }

    /// Copy the data staged for `attr_handle` into `out`
    ///
    /// Meant for use while handling an auth request. Returns the value length,
    /// 0 if nothing was staged for the attribute.
    ///
    /// Only staged bytes are written. Bytes of `out` below the first staged
    /// offset keep whatever the caller put there, so pre-fill `out` with the
    /// current attribute value to see the value the commit will produce.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] before init
    /// - [`Error::NotFound`] if the attribute is not registered
    /// - [`Error::NoMemory`] if `out` is smaller than the staged value
    pub fn value_get(&self, attr_handle: AttrHandle, out: &mut [u8]) -> Result<usize, Error> {
        if !self.initialized {
            return Err(Error::InvalidState);
        }
        if !self.attr_handles.contains(&attr_handle) {
            return Err(Error::NotFound);
        }
        match &self.queue {
            Some(queue) => queue.value_get(attr_handle, out),
            None => Ok(0),
        }
    }

    /// Stage a prepare write for the bound link
    ///
    /// # Errors
    /// - [`Error::InvalidState`] before init, with no link bound, or while an
    ///   execute write is still being applied
    /// - [`Error::NotFound`] if the attribute is not registered
    /// - [`Error::NoMemory`] if the write list or the staging buffer is full
    pub fn prepare_write(
        &mut self,
        attr_handle: AttrHandle,
        offset: u16,
        data: &[u8],
    ) -> Result<(), Error> {
        if !self.initialized || self.conn_handle == CONN_HANDLE_INVALID {
            return Err(Error::InvalidState);
        }
        if !self.attr_handles.contains(&attr_handle) {
            return Err(Error::NotFound);
        }
        if self.commit.is_some() {
            return Err(Error::InvalidState);
        }
        if self.written.is_full() {
            return Err(Error::NoMemory);
        }

        let queue = self.queue.as_mut().ok_or(Error::NoMemory)?;
        queue.push(attr_handle, offset, data)?;
        self.written
            .push(attr_handle)
            .map_err(|_| Error::NoMemory)
    }

    /// Handle an event from the stack
    ///
    /// Returns the authorize reply for prepare write and execute write
    /// requests on the bound link, `None` for everything else.
    pub fn on_ble_evt<S: BleStack>(
        &mut self,
        stack: &mut S,
        event: &StackEvent,
    ) -> Option<GattStatus> {
        if !self.initialized {
            return None;
        }

        match event {
            StackEvent::Connected { conn_handle } => {
                self.on_connect(*conn_handle);
                return None;
            }
            StackEvent::ResourcesAvailable => {
                self.on_resources_available(stack);
                return None;
            }
            _ => {}
        }

        if self.conn_handle == CONN_HANDLE_INVALID || event.conn_handle() != Some(self.conn_handle)
        {
            return None;
        }

        match event {
            StackEvent::Disconnected { reason, .. } => {
                self.on_disconnect(*reason);
                None
            }
            StackEvent::PrepareWrite {
                attr_handle,
                offset,
                data,
                ..
            } => Some(self.on_prepare_write(*attr_handle, *offset, data)),
            StackEvent::ExecuteWrite {
                flag: ExecWriteFlag::Flush,
                ..
            } => Some(self.on_execute_write(stack)),
            StackEvent::ExecuteWrite {
                flag: ExecWriteFlag::Cancel,
                ..
            } => Some(self.on_cancel(stack)),
            StackEvent::UserMemoryRequest { .. } => {
                self.user_mem_reply(stack);
                None
            }
            StackEvent::UserMemoryRelease { .. } => {
                self.on_user_mem_release();
                None
            }
            StackEvent::Connected { .. } | StackEvent::ResourcesAvailable => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Bound link, [`CONN_HANDLE_INVALID`] if unassigned
    pub fn conn_handle(&self) -> ConnHandle {
        self.conn_handle
    }

    pub fn state(&self) -> QwrState {
        if self.conn_handle == CONN_HANDLE_INVALID {
            QwrState::Unassigned
        } else if self.pending_memory_reply() {
            QwrState::MemoryReplyDeferred
        } else if self.commit.is_some() {
            QwrState::CommitPending
        } else if !self.written.is_empty() {
            QwrState::Accumulating
        } else {
            QwrState::Idle
        }
    }

    /// True while a memory reply or an apply step waits for `ResourcesAvailable`
    pub fn pending_memory_reply(&self) -> bool {
        self.mem_reply_pending || self.commit.as_ref().is_some_and(|c| c.deferred)
    }

    pub fn registered_handles(&self) -> &[AttrHandle] {
        &self.attr_handles
    }

    /// Handles written in the current cycle, in arrival order
    pub fn written_handles(&self) -> &[AttrHandle] {
        &self.written
    }

    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    pub fn handler_mut(&mut self) -> Option<&mut H> {
        self.handler.as_mut()
    }

    fn on_connect(&mut self, conn_handle: ConnHandle) {
        if self.conn_handle == CONN_HANDLE_INVALID {
            // Only fails before init, which on_ble_evt already excludes
            let _ = self.conn_handle_assign(conn_handle);
        } else if self.conn_handle != conn_handle {
            warn!(
                "qwr: already bound to link {:#06x}, ignoring link {:#06x}",
                self.conn_handle, conn_handle
            );
        }
    }

    fn on_disconnect(&mut self, reason: u8) {
        info!(
            "qwr: link {:#06x} disconnected (reason {:#04x})",
            self.conn_handle, reason
        );
        self.reset_cycle();
        self.block_supplied = false;
        self.mem_reply_pending = false;
        self.conn_handle = CONN_HANDLE_INVALID;
    }

    fn on_prepare_write(&mut self, attr_handle: AttrHandle, offset: u16, data: &[u8]) -> GattStatus {
        match self.prepare_write(attr_handle, offset, data) {
            Ok(()) => GattStatus::SUCCESS,
            Err(Error::NoMemory) => {
                debug!("qwr: prepare queue full, rejecting {:#06x}", attr_handle);
                GattStatus::ATTERR_PREPARE_QUEUE_FULL
            }
            Err(e) => {
                debug!("qwr: rejecting prepare write to {:#06x}: {:?}", attr_handle, e);
                GattStatus::QWR_REJECT_REQUEST
            }
        }
    }

    fn on_execute_write<S: BleStack>(&mut self, stack: &mut S) -> GattStatus {
        if self.commit.is_some() {
            debug!("qwr: execute write while applying, rejecting");
            return GattStatus::QWR_REJECT_REQUEST;
        }
        if self.written.is_empty() {
            debug!("qwr: nothing to execute");
            self.finish_cycle(stack);
            return GattStatus::SUCCESS;
        }

        let mut handles: Vec<AttrHandle, N> = Vec::new();
        for &attr_handle in self.written.iter() {
            if !handles.contains(&attr_handle) {
                // Never exceeds N, handles is a subset of written
                let _ = handles.push(attr_handle);
            }
        }

        if !self.offsets_valid(stack, &handles) {
            debug!("qwr: staged offset beyond attribute value, rejecting");
            self.finish_cycle(stack);
            return GattStatus::ATTERR_INVALID_OFFSET;
        }

        let Some(handler) = self.handler.as_mut() else {
            return GattStatus::QWR_REJECT_REQUEST;
        };

        // Every write is put to the application; the first objection is the reply
        let mut status = GattStatus::SUCCESS;
        for &attr_handle in self.written.iter() {
            let reply = handler.on_event(&QwrEvent::auth_request(attr_handle));
            if status.is_success() && !reply.is_success() {
                status = reply;
            }
        }

        if !status.is_success() {
            debug!("qwr: execute write rejected with {:#06x}", status.0);
            self.finish_cycle(stack);
            return status;
        }

        self.commit = Some(Commit {
            handles,
            next: 0,
            deferred: false,
        });
        self.resume_commit(stack);

        GattStatus::SUCCESS
    }

    /// Check that every staged fragment starts within the value it extends
    fn offsets_valid<S: BleStack>(&self, stack: &mut S, handles: &[AttrHandle]) -> bool {
        let Some(queue) = self.queue.as_ref() else {
            return true;
        };
        let mut value = [0u8; MAX_ATTR_VALUE_LEN];

        handles.iter().all(|&attr_handle| {
            match stack.attr_value_get(self.conn_handle, attr_handle, &mut value) {
                Ok(len) => queue.offsets_valid(attr_handle, len),
                // Checked again by the apply step
                Err(_) => true,
            }
        })
    }

    fn on_cancel<S: BleStack>(&mut self, stack: &mut S) -> GattStatus {
        if self.commit.is_some() {
            // Nothing of the new cycle is staged while a commit is applied
            return GattStatus::SUCCESS;
        }
        debug!("qwr: execute write cancelled, dropping {} writes", self.written.len());
        self.finish_cycle(stack);
        GattStatus::SUCCESS
    }

    fn on_resources_available<S: BleStack>(&mut self, stack: &mut S) {
        if self.conn_handle == CONN_HANDLE_INVALID {
            return;
        }
        if self.mem_reply_pending {
            self.user_mem_reply(stack);
        }
        if self.commit.as_ref().is_some_and(|c| c.deferred) {
            self.resume_commit(stack);
        }
    }

    fn on_user_mem_release(&mut self) {
        self.block_supplied = false;
        if self.commit.is_none() && !self.written.is_empty() {
            debug!("qwr: memory block released by stack, dropping staged writes");
            self.reset_cycle();
        }
    }

    /// Apply the remaining handles of the commit in progress
    fn resume_commit<S: BleStack>(&mut self, stack: &mut S) {
        let Some(mut commit) = self.commit.take() else {
            return;
        };
        commit.deferred = false;

        while let Some(&attr_handle) = commit.handles.get(commit.next) {
            match self.apply(stack, attr_handle) {
                Ok(()) => commit.next += 1,
                Err(Error::Stack(e)) if e.is_busy() => {
                    debug!("qwr: stack busy applying {:#06x}, deferring", attr_handle);
                    commit.deferred = true;
                    self.commit = Some(commit);
                    return;
                }
                Err(e) => {
                    warn!("qwr: applying {:#06x} failed: {:?}", attr_handle, e);
                    self.report_error(e);
                    self.finish_cycle(stack);
                    return;
                }
            }
        }

        if let Some(handler) = self.handler.as_mut() {
            for &attr_handle in commit.handles.iter() {
                handler.on_event(&QwrEvent::execute_write(attr_handle));
            }
        }
        self.finish_cycle(stack);
    }

    /// Write the final staged value of one attribute through the stack
    ///
    /// Bytes before the first staged offset keep their current value.
    fn apply<S: BleStack>(&self, stack: &mut S, attr_handle: AttrHandle) -> Result<(), Error> {
        let queue = self.queue.as_ref().ok_or(Error::NoMemory)?;
        let mut value = [0u8; MAX_ATTR_VALUE_LEN];

        let current_len = stack.attr_value_get(self.conn_handle, attr_handle, &mut value)?;
        if !queue.offsets_valid(attr_handle, current_len) {
            return Err(Error::InvalidParameter);
        }
        let len = queue.value_get(attr_handle, &mut value)?;
        stack.attr_value_set(self.conn_handle, attr_handle, &value[..len])?;
        Ok(())
    }

    fn user_mem_reply<S: BleStack>(&mut self, stack: &mut S) {
        let block_len = match &self.queue {
            Some(queue) if N > 0 && queue.capacity() > 0 => Some(queue.capacity()),
            _ => None,
        };

        match stack.user_mem_reply(self.conn_handle, block_len) {
            Ok(()) => {
                self.mem_reply_pending = false;
                self.block_supplied = block_len.is_some();
            }
            Err(e) if e.is_busy() => {
                debug!("qwr: stack busy, memory reply deferred");
                self.mem_reply_pending = true;
            }
            Err(e) => {
                warn!("qwr: memory reply failed: {:?}", e);
                self.mem_reply_pending = false;
                self.report_error(e.into());
            }
        }
    }

    /// End the current cycle and hand the staging block back
    fn finish_cycle<S: BleStack>(&mut self, stack: &mut S) {
        self.reset_cycle();

        if self.block_supplied {
            self.block_supplied = false;
            if let Err(e) = stack.user_mem_release(self.conn_handle) {
                warn!("qwr: memory release failed: {:?}", e);
                self.report_error(e.into());
            }
        }
    }

    fn reset_cycle(&mut self) {
        self.written.clear();
        self.commit = None;
        if let Some(queue) = self.queue.as_mut() {
            queue.clear();
        }
    }

    fn report_error(&mut self, error: Error) {
        if let Some(handler) = self.handler.as_mut() {
            handler.on_error(error);
        }
    }
}

impl<'a, H: QwrHandler, const N: usize> Default for QueuedWrites<'a, H, N> {
    fn default() -> Self {
        Self::new()
    }
}
