//! # Circular log buffer
//!
//! [`CircularLogBuffer`] keeps the last `capacity` records written to it. Records are
//! opaque byte strings (usually one formatted log line each).
//!
//! ## Rules
//! - `len() <= capacity()` at all times
//! - once full, each write evicts exactly the oldest record (FIFO)
//! - [`entries`](CircularLogBuffer::entries) returns copies, oldest first
//! - the lock is held only while the ring is mutated or copied, never across I/O
//!
//! ```text
//! capacity = 4, after writing a b c d e f:
//!
//!   slots:  [ e ][ f ][ c ][ d ]
//!                     ▲ cursor (next write, also the oldest record)
//!   entries() → c d e f
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

/// Capacity used when a buffer is created with capacity `0`.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

struct Ring {
    slots: Vec<Vec<u8>>,
    cursor: usize,
    len: usize,
    full: bool,
}

/// Thread-safe fixed-capacity ring buffer of byte records.
///
/// Cloning is cheap and yields a handle to the same buffer.
#[derive(Clone)]
pub struct CircularLogBuffer {
    ring: Arc<Mutex<Ring>>,
    capacity: usize,
}

impl CircularLogBuffer {
    /// Creates a buffer holding up to `capacity` records.
    ///
    /// A capacity of `0` would make a permanently empty buffer, so it is replaced by
    /// [`DEFAULT_LOG_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_LOG_CAPACITY
        } else {
            capacity
        };
        Self {
            ring: Arc::new(Mutex::new(Ring {
                slots: Vec::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                cursor: 0,
                len: 0,
                full: false,
            })),
            capacity,
        }
    }

    /// Appends one record, evicting the oldest one when full.
    ///
    /// Returns the number of bytes stored.
    pub fn write(&self, record: &[u8]) -> usize {
        let owned = record.to_vec();
        let mut ring = self.ring.lock();
        let cursor = ring.cursor;
        if ring.slots.len() < self.capacity {
            ring.slots.push(owned);
        } else {
            ring.slots[cursor] = owned;
        }
        ring.cursor = (cursor + 1) % self.capacity;
        // Once full the write above evicted the oldest record and the size is unchanged.
        if !ring.full {
            ring.len += 1;
            ring.full = ring.len == self.capacity;
        }
        record.len()
    }

    /// Returns copies of all stored records, oldest first.
    pub fn entries(&self) -> Vec<Vec<u8>> {
        let ring = self.ring.lock();
        if !ring.full {
            return ring.slots[..ring.len].to_vec();
        }
        let mut out = Vec::with_capacity(ring.len);
        out.extend_from_slice(&ring.slots[ring.cursor..]);
        out.extend_from_slice(&ring.slots[..ring.cursor]);
        out
    }

    /// Returns the stored records decoded as (lossy) UTF-8 lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|r| String::from_utf8_lossy(&r).trim_end_matches('\n').to_string())
            .collect()
    }

    /// Drops every record.
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.slots.clear();
        ring.cursor = 0;
        ring.len = 0;
        ring.full = false;
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CircularLogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl std::fmt::Debug for CircularLogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularLogBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
