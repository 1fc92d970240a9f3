//! Dense connection index tracking
//!
//! Maps the stack's recycled connection handles onto small indices
//! `0..MAX_CONNECTIONS` that per-link storage can be indexed with.

use crate::config::conn_state::MAX_CONNECTIONS;
use crate::error::Error;
use crate::gatt::{ConnHandle, CONN_HANDLE_INVALID};

/// Resolves a connection handle to its dense index
pub trait ConnIndex {
    /// Index of a tracked connection, or `None` if the handle is unknown
    fn conn_index(&self, conn_handle: ConnHandle) -> Option<usize>;
}

/// Tracks which connection handle occupies each dense index
#[derive(Debug, Clone)]
pub struct ConnState<const C: usize = MAX_CONNECTIONS> {
    handles: [ConnHandle; C],
}

impl<const C: usize> ConnState<C> {
    /// Create a tracker with every index free
    pub const fn new() -> Self {
        Self {
            handles: [CONN_HANDLE_INVALID; C],
        }
    }

    /// Record a new link, assigning the lowest free index
    ///
    /// A handle that is already tracked keeps its index.
    pub fn connect(&mut self, conn_handle: ConnHandle) -> Result<usize, Error> {
        if conn_handle == CONN_HANDLE_INVALID {
            return Err(Error::InvalidParameter);
        }
        if let Some(index) = self.conn_index(conn_handle) {
            return Ok(index);
        }

        let index = self
            .handles
            .iter()
            .position(|&h| h == CONN_HANDLE_INVALID)
            .ok_or(Error::NoMemory)?;
        self.handles[index] = conn_handle;
        Ok(index)
    }

    /// Forget a link, freeing its index for reuse
    pub fn disconnect(&mut self, conn_handle: ConnHandle) -> Option<usize> {
        let index = self.conn_index(conn_handle)?;
        self.handles[index] = CONN_HANDLE_INVALID;
        Some(index)
    }

    /// Number of tracked links
    pub fn active_count(&self) -> usize {
        self.handles
            .iter()
            .filter(|&&h| h != CONN_HANDLE_INVALID)
            .count()
    }

    /// Tracked connection handles with their indices
    pub fn iter(&self) -> impl Iterator<Item = (usize, ConnHandle)> + '_ {
        self.handles
            .iter()
            .enumerate()
            .filter(|(_, h)| **h != CONN_HANDLE_INVALID)
            .map(|(i, &h)| (i, h))
    }
}

impl<const C: usize> Default for ConnState<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> ConnIndex for ConnState<C> {
    fn conn_index(&self, conn_handle: ConnHandle) -> Option<usize> {
        if conn_handle == CONN_HANDLE_INVALID {
            return None;
        }
        self.handles
            .iter()
            .position(|&h| h == conn_handle)
    }
}
