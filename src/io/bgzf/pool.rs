//! Size-classed buffer pool.
//!
//! Decode and encode paths borrow scratch `Vec<u8>`s from a [`BufferPool`]
//! instead of allocating per record. A [`PooledBuffer`] hands its storage
//! back when dropped, so a buffer is returned exactly once on every exit
//! path, including `?` early returns.
//!
//! Buffers are grouped by power-of-two capacity between 256 B and 1 MiB.
//! Requests above the largest class are served by plain allocations that are
//! not retained.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

const MIN_CLASS_SHIFT: u32 = 8;
const MAX_CLASS_SHIFT: u32 = 20;
const NUM_CLASSES: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

/// Default number of idle buffers retained per size class.
pub const DEFAULT_MAX_PER_CLASS: usize = 8;

/// Pool of reusable byte buffers keyed by size class.
///
/// Shared through an `Arc`; the free lists sit behind one `parking_lot`
/// mutex, which is only held to push or pop a `Vec`.
#[derive(Debug)]
pub struct BufferPool {
    classes: Mutex<Vec<Vec<Vec<u8>>>>,
    max_per_class: usize,
}

impl BufferPool {
    /// Create a pool keeping at most `max_per_class` idle buffers per class.
    pub fn new(max_per_class: usize) -> Arc<Self> {
        Arc::new(Self {
            classes: Mutex::new(vec![Vec::new(); NUM_CLASSES]),
            max_per_class,
        })
    }

    /// Borrow an empty buffer with capacity of at least `min_len`.
    pub fn acquire(self: &Arc<Self>, min_len: usize) -> PooledBuffer {
        let buffer = match class_index(min_len) {
            Some(class) => self.classes.lock()[class]
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(class_capacity(class))),
            None => Vec::with_capacity(min_len),
        };
        PooledBuffer {
            buffer,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.classes.lock().iter().map(Vec::len).sum()
    }

    fn release(&self, mut buffer: Vec<u8>) {
        // File a buffer under the largest class its capacity fully covers
        let Some(class) = capacity_class(buffer.capacity()) else {
            return;
        };
        buffer.clear();
        let mut classes = self.classes.lock();
        if classes[class].len() < self.max_per_class {
            classes[class].push(buffer);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self {
            classes: Mutex::new(vec![Vec::new(); NUM_CLASSES]),
            max_per_class: DEFAULT_MAX_PER_CLASS,
        }
    }
}

fn class_capacity(class: usize) -> usize {
    1 << (class as u32 + MIN_CLASS_SHIFT)
}

/// Smallest class whose capacity holds `len`.
fn class_index(len: usize) -> Option<usize> {
    let shift = len.max(1).next_power_of_two().trailing_zeros().max(MIN_CLASS_SHIFT);
    (shift <= MAX_CLASS_SHIFT).then(|| (shift - MIN_CLASS_SHIFT) as usize)
}

/// Largest class whose capacity is at most `capacity`.
fn capacity_class(capacity: usize) -> Option<usize> {
    if capacity < class_capacity(0) || capacity > class_capacity(NUM_CLASSES - 1) {
        return None;
    }
    let shift = usize::BITS - 1 - capacity.leading_zeros();
    Some((shift - MIN_CLASS_SHIFT) as usize)
}

/// A buffer on loan from a [`BufferPool`]; returned on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}
