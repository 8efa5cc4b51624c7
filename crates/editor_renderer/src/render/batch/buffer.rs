//! Fixed-capacity vertex staging buffer

use bytemuck::Pod;

/// CPU-side staging storage with an index cursor
///
/// Storage is allocated once; `count` never exceeds `capacity` and writes
/// past the end are rejected instead of reallocating.
#[derive(Debug, Clone)]
pub struct BatchBuffer<T> {
    data: Vec<T>,
    count: usize,
}

impl<T: Copy + Default> BatchBuffer<T> {
    /// Allocate `capacity` default-initialised slots
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
            count: 0,
        }
    }

    /// Append `item`; returns false when the buffer is full
    pub fn write(&mut self, item: T) -> bool {
        match self.data.get_mut(self.count) {
            Some(slot) => {
                *slot = item;
                self.count += 1;
                true
            }
            None => false,
        }
    }

    /// Slot at the cursor, `None` when full
    pub fn current(&mut self) -> Option<&mut T> {
        self.data.get_mut(self.count)
    }

    /// Move the cursor forward by one
    pub fn advance(&mut self) {
        self.advance_by(1);
    }

    /// Move the cursor forward by `n`, clamped to capacity
    pub fn advance_by(&mut self, n: usize) {
        self.count = self.count.saturating_add(n).min(self.data.len());
    }

    /// Rewind the cursor without releasing storage
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Number of written items
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Fixed capacity
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing was written since the last reset
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether no further item fits
    pub fn is_full(&self) -> bool {
        self.count >= self.data.len()
    }

    /// Whether `n` more items fit
    pub fn has_space(&self, n: usize) -> bool {
        self.data.len() - self.count >= n
    }

    /// Written range
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.count]
    }

    /// Size of the written range in bytes
    pub const fn data_size(&self) -> usize {
        self.count * std::mem::size_of::<T>()
    }
}

impl<T: Pod + Default> BatchBuffer<T> {
    /// Written range as raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }
}
