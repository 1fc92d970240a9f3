//! Prepared write staging in the caller-supplied memory buffer
//!
//! Records use the layout the stack expects in a user memory block:
//! ```text
//! [attr_handle: u16 LE][offset: u16 LE][len: u16 LE][data: [u8; len]] ...
//! ```
//! followed by a record whose handle is `0x0000` when there is room for it.

use crate::error::Error;
use crate::gatt::{AttrHandle, ATTR_HANDLE_INVALID};

/// Size of a record header
pub const RECORD_HEADER_LEN: usize = 6;

/// One staged prepare write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedWrite<'b> {
    pub attr_handle: AttrHandle,
    pub offset: u16,
    pub data: &'b [u8],
}

impl PreparedWrite<'_> {
    /// Offset one past the last byte this fragment covers
    pub fn end(&self) -> usize {
        self.offset as usize + self.data.len()
    }
}

/// Staging area for prepared writes
pub struct PrepareQueue<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> PrepareQueue<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        let mut queue = Self { buf, len: 0 };
        queue.terminate();
        queue
    }

    /// Total buffer size
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes used by staged records
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a record
    ///
    /// Fails with [`Error::NoMemory`] if it does not fit. The queue is left
    /// unchanged in that case.
    pub fn push(&mut self, attr_handle: AttrHandle, offset: u16, data: &[u8]) -> Result<(), Error> {
        let data_len = u16::try_from(data.len()).map_err(|_| Error::NoMemory)?;
        let record_len = RECORD_HEADER_LEN + data.len();
        if self.buf.len() - self.len < record_len {
            return Err(Error::NoMemory);
        }

        let record = &mut self.buf[self.len..self.len + record_len];
        record[0..2].copy_from_slice(&attr_handle.to_le_bytes());
        record[2..4].copy_from_slice(&offset.to_le_bytes());
        record[4..6].copy_from_slice(&data_len.to_le_bytes());
        record[RECORD_HEADER_LEN..].copy_from_slice(data);
        self.len += record_len;

        self.terminate();
        Ok(())
    }

    /// Discard every staged record
    pub fn clear(&mut self) {
        self.len = 0;
        self.terminate();
    }

    /// Iterate over staged records in arrival order
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            buf: &self.buf[..self.len],
            pos: 0,
        }
    }

    /// Linear copy of everything staged for `attr_handle`
    ///
    /// Fragments are copied at their offsets in arrival order, so a later
    /// fragment overwrites an earlier one where they overlap. Returns the end
    /// of the furthest fragment, or 0 if nothing was staged for the handle.
    ///
    /// Fails with [`Error::NoMemory`] if `out` is too small.
    pub fn value_get(&self, attr_handle: AttrHandle, out: &mut [u8]) -> Result<usize, Error> {
        let mut len = 0;
        for write in self.entries().filter(|w| w.attr_handle == attr_handle) {
            let end = write.end();
            if end > out.len() {
                return Err(Error::NoMemory);
            }
            out[write.offset as usize..end].copy_from_slice(write.data);
            len = len.max(end);
        }
        Ok(len)
    }

    /// True if every fragment for `attr_handle` starts at or before the end
    /// of the value built so far, starting from `current_len` bytes
    pub fn offsets_valid(&self, attr_handle: AttrHandle, current_len: usize) -> bool {
        let mut len = current_len;
        for write in self.entries().filter(|w| w.attr_handle == attr_handle) {
            if write.offset as usize > len {
                return false;
            }
            len = len.max(write.end());
        }
        true
    }

    fn terminate(&mut self) {
        if self.buf.len() - self.len >= 2 {
            self.buf[self.len..self.len + 2].copy_from_slice(&ATTR_HANDLE_INVALID.to_le_bytes());
        }
    }
}

/// Iterator over staged records
pub struct Entries<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Iterator for Entries<'b> {
    type Item = PreparedWrite<'b>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        if rest.len() < RECORD_HEADER_LEN {
            return None;
        }

        let attr_handle = u16::from_le_bytes([rest[0], rest[1]]);
        if attr_handle == ATTR_HANDLE_INVALID {
            return None;
        }
        let offset = u16::from_le_bytes([rest[2], rest[3]]);
        let len = u16::from_le_bytes([rest[4], rest[5]]) as usize;

        let data = rest.get(RECORD_HEADER_LEN..RECORD_HEADER_LEN + len)?;
        self.pos += RECORD_HEADER_LEN + len;

        Some(PreparedWrite {
            attr_handle,
            offset,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_writes_stack_layout() {
        let mut buf = [0xFFu8; 16];
        let mut queue = PrepareQueue::new(&mut buf);

        queue.push(0x0010, 0x0002, &[0xAA, 0xBB]).unwrap();
        assert_eq!(queue.len(), 8);
        drop(queue);

        assert_eq!(
            &buf[..10],
            &[0x10, 0x00, 0x02, 0x00, 0x02, 0x00, 0xAA, 0xBB, 0x00, 0x00]
        );
    }

    #[test]
    fn test_entries_in_arrival_order() {
        let mut buf = [0u8; 64];
        let mut queue = PrepareQueue::new(&mut buf);

        queue.push(10, 0, &[1, 2]).unwrap();
        queue.push(11, 0, &[3]).unwrap();
        queue.push(10, 2, &[4]).unwrap();

        let handles: heapless::Vec<AttrHandle, 4> =
            queue.entries().map(|w| w.attr_handle).collect();
        assert_eq!(handles.as_slice(), &[10, 11, 10]);

        let last = queue.entries().last().unwrap();
        assert_eq!(last.offset, 2);
        assert_eq!(last.data, &[4]);
    }

    #[test]
    fn test_push_full() {
        let mut buf = [0u8; 10];
        let mut queue = PrepareQueue::new(&mut buf);

        queue.push(10, 0, &[1, 2]).unwrap();
        assert_eq!(queue.push(11, 0, &[3]), Err(Error::NoMemory));

        // Failed push leaves earlier records intact
        assert_eq!(queue.entries().count(), 1);
        assert_eq!(queue.len(), 8);
    }

    #[test]
    fn test_exact_fit_without_terminator() {
        let mut buf = [0u8; 8];
        let mut queue = PrepareQueue::new(&mut buf);

        queue.push(10, 0, &[1, 2]).unwrap();
        assert_eq!(queue.entries().count(), 1);
    }

    #[test]
    fn test_value_get_overlays_fragments() {
        let mut buf = [0u8; 64];
        let mut queue = PrepareQueue::new(&mut buf);

        queue.push(10, 0, &[1, 2, 3, 4]).unwrap();
        queue.push(11, 0, &[9]).unwrap();
        queue.push(10, 4, &[5, 6]).unwrap();
        queue.push(10, 1, &[0x22]).unwrap();

        let mut out = [0u8; 8];
        let len = queue.value_get(10, &mut out).unwrap();
        assert_eq!(&out[..len], &[1, 0x22, 3, 4, 5, 6]);
    }

    #[test]
    fn test_value_get_nothing_staged() {
        let mut buf = [0u8; 32];
        let mut queue = PrepareQueue::new(&mut buf);
        queue.push(11, 0, &[9]).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(queue.value_get(10, &mut out), Ok(0));
    }

    #[test]
    fn test_value_get_out_too_small() {
        let mut buf = [0u8; 32];
        let mut queue = PrepareQueue::new(&mut buf);
        queue.push(10, 2, &[1, 2, 3]).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(queue.value_get(10, &mut out), Err(Error::NoMemory));
    }

    #[test]
    fn test_clear() {
        let mut buf = [0u8; 32];
        let mut queue = PrepareQueue::new(&mut buf);
        queue.push(10, 0, &[1]).unwrap();

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.entries().count(), 0);
        queue.push(12, 0, &[2]).unwrap();
        assert_eq!(queue.entries().next().unwrap().attr_handle, 12);
    }

    #[test]
    fn test_offsets_valid() {
        let mut buf = [0u8; 64];
        let mut queue = PrepareQueue::new(&mut buf);
        queue.push(10, 2, &[1, 2]).unwrap();
        queue.push(10, 4, &[3]).unwrap();
        queue.push(11, 9, &[4]).unwrap();

        assert!(queue.offsets_valid(10, 2));
        assert!(!queue.offsets_valid(10, 1));
        assert!(!queue.offsets_valid(11, 8));
        assert!(queue.offsets_valid(12, 0));
    }
}
