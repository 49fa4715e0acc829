//! Processor cursor: the next block number to process.

use std::sync::atomic::{AtomicU64, Ordering};

/// The processor's position in the chain.
///
/// Only the active acquisition strategy writes to it; callers read it to
/// checkpoint progress. The value never decreases.
#[derive(Debug)]
pub struct Cursor {
    next: AtomicU64,
}

impl Cursor {
    /// Create a cursor that will process `next_block` first.
    pub fn new(next_block: u64) -> Self {
        Self {
            next: AtomicU64::new(next_block),
        }
    }

    /// The next block number the processor intends to process.
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    /// Mark `block_number` as processed. Returns the new cursor value.
    pub fn advance_past(&self, block_number: u64) -> u64 {
        let target = block_number.saturating_add(1);
        self.next.fetch_max(target, Ordering::AcqRel).max(target)
    }

    /// Returns `true` if the cursor has reached `head`.
    pub fn is_at_real_time(&self, head: u64) -> bool {
        self.current() >= head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advance() {
        let cursor = Cursor::new(100);
        assert_eq!(cursor.advance_past(100), 101);
        assert_eq!(cursor.current(), 101);
    }

    #[test]
    fn cursor_never_decreases() {
        let cursor = Cursor::new(500);
        cursor.advance_past(510);
        assert_eq!(cursor.advance_past(505), 511);
        assert_eq!(cursor.current(), 511);
    }

    #[test]
    fn cursor_real_time() {
        let cursor = Cursor::new(105);
        assert!(cursor.is_at_real_time(105));
        assert!(cursor.is_at_real_time(104));
        assert!(!cursor.is_at_real_time(106));
    }
}
