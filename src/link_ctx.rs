//! Link context registry
//!
//! Maps a connection handle to a fixed per-link slot in memory reserved at
//! startup. Services use it to keep their own per-connection data without
//! allocating. Lookups are pure index arithmetic: nothing is allocated and the
//! store is never mutated by a lookup.
//!
//! Slot content is not cleared when a new connection takes over an index that
//! a previous peer used. Callers must initialise their context on connect.

use crate::config::link_ctx::WORD_SIZE;
use crate::conn_state::ConnIndex;
use crate::error::Error;
use crate::gatt::ConnHandle;

/// Bytes needed for a pool of `max_links` slots of `ctx_size` bytes, each
/// slot rounded up to a whole number of words
pub const fn pool_len(max_links: usize, ctx_size: usize) -> usize {
    max_links * ctx_size.div_ceil(WORD_SIZE) * WORD_SIZE
}

/// Raw per-link storage descriptor over a caller-owned byte pool
pub struct LinkCtxStorage<'a> {
    pool: &'a mut [u8],
    max_links: u8,
    ctx_size: u16,
}

impl<'a> LinkCtxStorage<'a> {
    /// Describe `pool` as `max_links` slots of `ctx_size` bytes
    ///
    /// Sizes are validated on every lookup, not here.
    pub fn new(pool: &'a mut [u8], max_links: u8, ctx_size: u16) -> Self {
        Self {
            pool,
            max_links,
            ctx_size,
        }
    }

    pub fn max_links(&self) -> u8 {
        self.max_links
    }

    pub fn ctx_size(&self) -> u16 {
        self.ctx_size
    }

    /// Context slot of the link identified by `conn_handle`
    ///
    /// # Errors
    /// - [`Error::Null`] if the pool is empty
    /// - [`Error::InvalidParameter`] if the slot size is not word aligned or
    ///   the pool length does not match `max_links * ctx_size`
    /// - [`Error::NotFound`] if the handle is not a tracked connection
    /// - [`Error::NoMemory`] if the connection's index has no slot
    pub fn get<R: ConnIndex + ?Sized>(
        &mut self,
        resolver: &R,
        conn_handle: ConnHandle,
    ) -> Result<&mut [u8], Error> {
        if self.pool.is_empty() {
            return Err(Error::Null);
        }

        let ctx_size = self.ctx_size as usize;
        if ctx_size % WORD_SIZE != 0 {
            return Err(Error::InvalidParameter);
        }
        if self.pool.len() != self.max_links as usize * ctx_size {
            return Err(Error::InvalidParameter);
        }

        let index = resolver.conn_index(conn_handle).ok_or(Error::NotFound)?;
        if index >= self.max_links as usize {
            return Err(Error::NoMemory);
        }

        let start = index * ctx_size;
        Ok(&mut self.pool[start..start + ctx_size])
    }
}

/// Typed per-link storage: one `T` per dense connection index
pub struct LinkContexts<T, const L: usize> {
    slots: [T; L],
}

impl<T, const L: usize> LinkContexts<T, L> {
    pub const fn new(slots: [T; L]) -> Self {
        Self { slots }
    }

    /// Build every slot from its index
    pub fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: core::array::from_fn(f),
        }
    }

    /// Context of the link identified by `conn_handle`
    ///
    /// Fails with [`Error::NotFound`] for an unknown handle and
    /// [`Error::NoMemory`] when its index is beyond the last slot.
    pub fn get<R: ConnIndex + ?Sized>(
        &mut self,
        resolver: &R,
        conn_handle: ConnHandle,
    ) -> Result<&mut T, Error> {
        let index = resolver.conn_index(conn_handle).ok_or(Error::NotFound)?;
        self.slots.get_mut(index).ok_or(Error::NoMemory)
    }

    pub fn slot(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }
}
