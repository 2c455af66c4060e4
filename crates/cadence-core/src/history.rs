use std::time::Duration;

/// Number of inter-arrival intervals kept per service for the
/// average-rate check.
pub const AVG_FREQ_HISTORY: usize = 100;

/// A fixed-capacity ring that evicts its oldest entry on overflow.
///
/// Storage is a plain array addressed by a head index and a count, so a
/// push never allocates or shifts.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize>
where
    T: Copy + Default,
{
    slots: [T; N],
    /// Index of the oldest entry.
    head: usize,
    len: usize,
}

impl<T, const N: usize> Default for RingBuffer<T, N>
where
    T: Copy + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> RingBuffer<T, N>
where
    T: Copy + Default,
{
    pub fn new() -> Self {
        Self {
            slots: [T::default(); N],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a value. When the ring is full the oldest value is
    /// overwritten and returned.
    pub fn push(&mut self, value: T) -> Option<T> {
        if N == 0 {
            return Some(value);
        }

        if self.len < N {
            self.slots[(self.head + self.len) % N] = value;
            self.len += 1;
            None
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.head], value);
            self.head = (self.head + 1) % N;
            Some(evicted)
        }
    }

    /// The oldest retained value.
    pub fn front(&self) -> Option<T> {
        (!self.is_empty()).then(|| self.slots[self.head])
    }

    /// The most recently pushed value.
    pub fn back(&self) -> Option<T> {
        (!self.is_empty()).then(|| self.slots[(self.head + self.len - 1) % N])
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |offset| self.slots[(self.head + offset) % N])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl<const N: usize> RingBuffer<Duration, N> {
    /// Arithmetic mean of the retained intervals.
    pub fn mean(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        let total: Duration = self.iter().sum();
        let count = u32::try_from(self.len).unwrap_or(u32::MAX);
        Some(total / count)
    }
}
