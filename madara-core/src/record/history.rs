//! Fixed-capacity circular history buffer attached to a single record.
//!
//! Capacity 0 disables history entirely (the default). Indices `0..len`
//! address oldest-first; negative indices count from newest, matching
//! `get_history(lo, count)` in spec §4.1.

use super::Record;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    capacity: usize,
    buf: Vec<Record>,
    /// Index in `buf` of the oldest entry, when `buf` is at capacity.
    start: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: Vec::with_capacity(capacity.min(64)),
            start: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Changes capacity. Shrinking discards the oldest entries first.
    pub fn set_capacity(&mut self, new_capacity: usize) {
        if new_capacity == 0 {
            self.buf.clear();
            self.start = 0;
            self.capacity = 0;
            return;
        }
        if new_capacity < self.len() {
            let drop_count = self.len() - new_capacity;
            for _ in 0..drop_count {
                self.pop_oldest();
            }
        }
        self.capacity = new_capacity;
    }

    fn pop_oldest(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        self.buf.remove(self.start.min(self.buf.len() - 1));
    }

    /// Appends a snapshot. No-op if capacity is 0.
    pub fn push(&mut self, record: Record) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() >= self.capacity {
            self.pop_oldest();
        }
        self.buf.push(record);
    }

    /// Resolves a possibly-negative logical index (newest = -1) to an
    /// absolute index into oldest-first order, or `None` if out of range.
    fn resolve(&self, index: i64) -> Option<usize> {
        let len = self.buf.len() as i64;
        let absolute = if index < 0 { len + index } else { index };
        if absolute < 0 || absolute >= len {
            None
        } else {
            Some(absolute as usize)
        }
    }

    /// Returns up to `count` snapshots starting at logical index `lo`
    /// (oldest-first addressing; negative counts from newest).
    pub fn get(&self, lo: i64, count: usize) -> Vec<Record> {
        let Some(start) = self.resolve(lo) else {
            return Vec::new();
        };
        self.buf.iter().skip(start).take(count).cloned().collect()
    }

    /// Returns the single snapshot at `index` (supports negative indexing).
    pub fn get_one(&self, index: i64) -> Option<Record> {
        self.resolve(index).map(|i| self.buf[i].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn capacity_zero_discards_everything() {
        let mut h = History::new(0);
        h.push(Record::integer(1));
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn ring_buffer_scenario_from_spec() {
        // capacity 3; writes 1,2,3,4,5. get_history(0,3) -> [3,4,5];
        // get_history(-1) -> 5.
        let mut h = History::new(3);
        for v in 1..=5 {
            h.push(Record::integer(v));
        }
        let snapshot = h.get(0, 3);
        let values: Vec<i64> = snapshot.iter().map(|r| r.to_integer()).collect();
        assert_eq!(values, vec![3, 4, 5]);
        assert_eq!(h.get_one(-1).unwrap().to_integer(), 5);
    }

    #[test]
    fn shrinking_discards_oldest() {
        let mut h = History::new(5);
        for v in 1..=5 {
            h.push(Record::integer(v));
        }
        h.set_capacity(2);
        let values: Vec<i64> = h.get(0, 2).iter().map(|r| r.to_integer()).collect();
        assert_eq!(values, vec![4, 5]);
    }
}
