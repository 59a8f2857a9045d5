//! Generic dynamic sequences
//!
//! A growable array of individually heap-allocated element slots, all of
//! one fixed byte size chosen at creation. Insertion copies the element
//! bytes into a fresh slot, so the sequence owns everything it holds.
//!
//! Per-element slots (rather than one packed buffer) keep the structure
//! usable as a building block for heterogeneously-sized entries in the
//! map chains and the state store; the cost is one extra indirection per
//! access.
//!
//! Growth: capacity starts at 4 and doubles whenever an insertion finds
//! the slot array full. Removal preserves element order.

/// Initial slot capacity for new sequences.
pub const INITIAL_CAPACITY: usize = 4;

/// A homogeneous dynamic sequence of owned byte slots.
#[derive(Clone)]
pub struct Sequence {
    slots: Vec<Box<[u8]>>,
    elem_size: usize,
}

impl Sequence {
    /// Create an empty sequence for elements of `elem_size` bytes.
    /// Zero-sized elements are rejected.
    pub fn new(elem_size: usize) -> Option<Sequence> {
        if elem_size == 0 {
            return None;
        }
        Some(Sequence {
            slots: Vec::with_capacity(INITIAL_CAPACITY),
            elem_size,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Element bytes at `index`, or `None` out of bounds.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(index).map(|slot| &slot[..])
    }

    /// Overwrite the element at `index` with a copy of `element`.
    /// Fails (no mutation) when the index is out of bounds or the element
    /// has the wrong size.
    pub fn set(&mut self, index: usize, element: &[u8]) -> bool {
        if element.len() != self.elem_size || index >= self.slots.len() {
            return false;
        }
        self.slots[index] = element.into();
        true
    }

    /// Append a copy of `element`. Doubles the slot array when full.
    pub fn append(&mut self, element: &[u8]) -> bool {
        if element.len() != self.elem_size {
            return false;
        }
        self.grow_if_full();
        self.slots.push(element.into());
        true
    }

    /// Insert a copy of `element` at the front, shifting everything right.
    pub fn prepend(&mut self, element: &[u8]) -> bool {
        if element.len() != self.elem_size {
            return false;
        }
        self.grow_if_full();
        self.slots.insert(0, element.into());
        true
    }

    /// Remove the element at `index`, shifting later elements left.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.slots.len() {
            return false;
        }
        self.slots.remove(index);
        true
    }

    /// Drop every element but keep the slot array's capacity.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Reverse in place.
    pub fn reverse(&mut self) {
        self.slots.reverse();
    }

    /// Ensure room for at least `capacity` slots.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.slots.capacity() {
            self.slots.reserve_exact(capacity - self.slots.len());
        }
    }

    fn grow_if_full(&mut self) {
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(self.slots.capacity().max(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i64_bytes(v: i64) -> [u8; 8] {
        v.to_ne_bytes()
    }

    #[test]
    fn test_create() {
        let seq = Sequence::new(8).unwrap();
        assert_eq!(seq.len(), 0);
        assert!(seq.is_empty());
        assert_eq!(seq.capacity(), INITIAL_CAPACITY);
        assert_eq!(seq.elem_size(), 8);
    }

    #[test]
    fn test_zero_element_size_rejected() {
        assert!(Sequence::new(0).is_none());
    }

    #[test]
    fn test_append_get_round_trip() {
        let mut seq = Sequence::new(8).unwrap();
        for v in 0..10i64 {
            assert!(seq.append(&i64_bytes(v)));
        }
        assert_eq!(seq.len(), 10);
        for v in 0..10i64 {
            assert_eq!(seq.get(v as usize).unwrap(), &i64_bytes(v));
        }
    }

    #[test]
    fn test_capacity_doubles() {
        let mut seq = Sequence::new(8).unwrap();
        for v in 0..5i64 {
            seq.append(&i64_bytes(v));
        }
        assert_eq!(seq.capacity(), 8);
        for v in 5..9i64 {
            seq.append(&i64_bytes(v));
        }
        assert_eq!(seq.capacity(), 16);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let seq = Sequence::new(8).unwrap();
        assert!(seq.get(0).is_none());
    }

    #[test]
    fn test_set() {
        let mut seq = Sequence::new(8).unwrap();
        seq.append(&i64_bytes(1));
        assert!(seq.set(0, &i64_bytes(99)));
        assert_eq!(seq.get(0).unwrap(), &i64_bytes(99));
        // Out of bounds and size mismatch both fail without mutation.
        assert!(!seq.set(1, &i64_bytes(0)));
        assert!(!seq.set(0, &[1, 2, 3]));
        assert_eq!(seq.get(0).unwrap(), &i64_bytes(99));
    }

    #[test]
    fn test_prepend() {
        let mut seq = Sequence::new(8).unwrap();
        seq.append(&i64_bytes(2));
        seq.prepend(&i64_bytes(1));
        assert_eq!(seq.get(0).unwrap(), &i64_bytes(1));
        assert_eq!(seq.get(1).unwrap(), &i64_bytes(2));
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut seq = Sequence::new(8).unwrap();
        for v in 0..5i64 {
            seq.append(&i64_bytes(v));
        }
        assert!(seq.remove(1));
        assert_eq!(seq.len(), 4);
        let remaining: Vec<i64> = (0..4)
            .map(|i| i64::from_ne_bytes(seq.get(i).unwrap().try_into().unwrap()))
            .collect();
        assert_eq!(remaining, vec![0, 2, 3, 4]);
        assert!(!seq.remove(10));
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut seq = Sequence::new(8).unwrap();
        for v in 0..10i64 {
            seq.append(&i64_bytes(v));
        }
        let cap = seq.capacity();
        seq.clear();
        assert_eq!(seq.len(), 0);
        assert_eq!(seq.capacity(), cap);
    }

    #[test]
    fn test_reverse_is_involution() {
        let mut seq = Sequence::new(8).unwrap();
        for v in 0..7i64 {
            seq.append(&i64_bytes(v));
        }
        seq.reverse();
        assert_eq!(seq.get(0).unwrap(), &i64_bytes(6));
        seq.reverse();
        for v in 0..7i64 {
            assert_eq!(seq.get(v as usize).unwrap(), &i64_bytes(v));
        }
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Sequence::new(8).unwrap();
        original.append(&i64_bytes(1));
        original.append(&i64_bytes(2));
        let copy = original.clone();
        original.set(0, &i64_bytes(42));
        original.remove(1);
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.get(0).unwrap(), &i64_bytes(1));
        assert_eq!(copy.get(1).unwrap(), &i64_bytes(2));
    }

    #[test]
    fn test_reserve() {
        let mut seq = Sequence::new(8).unwrap();
        seq.reserve(100);
        assert!(seq.capacity() >= 100);
        // Reserving less than the current capacity is a no-op.
        seq.reserve(2);
        assert!(seq.capacity() >= 100);
    }
}
