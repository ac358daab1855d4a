use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Globally unique object id. Never reused, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "O({})", self.0)
    }
}

/// Process-wide monotonic id source shared by every chunk.
///
/// The counter holds the next id to hand out. After loading persisted
/// objects call [`ObjectIdSequence::raise_above`] with the highest id seen so
/// that new objects can never collide with stored ones.
#[derive(Debug)]
pub struct ObjectIdSequence {
    next: AtomicU64,
}

impl ObjectIdSequence {
    pub fn new(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next.max(1)),
        }
    }

    pub fn allocate(&self) -> ObjectId {
        ObjectId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to `allocate` returns.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    pub fn raise_above(&self, highest: u64) {
        self.next.fetch_max(highest.saturating_add(1), Ordering::Relaxed);
    }
}

impl Default for ObjectIdSequence {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_monotonic() {
        let seq = ObjectIdSequence::default();
        let a = seq.allocate();
        let b = seq.allocate();
        assert_eq!(a, ObjectId(1));
        assert!(b > a);
    }

    #[test]
    fn raise_above_never_lowers() {
        let seq = ObjectIdSequence::new(50);
        seq.raise_above(10);
        assert_eq!(seq.peek(), 50);
        seq.raise_above(99);
        assert_eq!(seq.allocate(), ObjectId(100));
    }

    #[test]
    fn zero_start_is_bumped() {
        assert_eq!(ObjectIdSequence::new(0).peek(), 1);
    }
}
