use std::collections::VecDeque;

/// Default capacity of the visible event list.
pub const DEFAULT_CAPACITY: usize = 500;

/// Newest-first, capacity-bounded view of a stream.
///
/// `insert` prepends; once full, the oldest entry falls off the tail. No
/// de-duplication happens here — server-assigned event ids are trusted not
/// to repeat, and the session turn feed de-duplicates at its own layer.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Prepend a new item, evicting the oldest if the buffer is full.
    pub fn insert(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    /// Swap the whole visible list at once. Used by the polling path so the
    /// view never shows a torn mix of old and new pages.
    pub fn replace(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.clear();
        self.items.extend(items.into_iter().take(self.capacity));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Snapshot the current contents, newest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for BoundedBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_prepends_newest_first() {
        let mut buf = BoundedBuffer::new(10);
        buf.insert(1);
        buf.insert(2);
        buf.insert(3);
        assert_eq!(buf.to_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut buf = BoundedBuffer::new(3);
        for n in 1..=4 {
            buf.insert(n);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.to_vec(), vec![4, 3, 2]);
    }

    #[test]
    fn replace_swaps_whole_list() {
        let mut buf = BoundedBuffer::new(5);
        buf.insert(1);
        buf.insert(2);
        buf.replace(vec![9, 8, 7]);
        assert_eq!(buf.to_vec(), vec![9, 8, 7]);
    }

    #[test]
    fn replace_respects_capacity() {
        let mut buf = BoundedBuffer::new(2);
        buf.replace(vec![1, 2, 3, 4]);
        assert_eq!(buf.to_vec(), vec![1, 2]);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut buf = BoundedBuffer::new(0);
        buf.insert(1);
        buf.insert(2);
        assert_eq!(buf.to_vec(), vec![2]);
    }
}
