//! Process-wide broadcast sequence counter.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::{EventTag, format_raw, format_tagged};

/// Wrapping 16-bit sequence shared by every broadcast source.
///
/// Each call to [`next`](Self::next) returns the current value and advances
/// the counter by one, wrapping from `0xFFFF` to `0x0000`. The read and the
/// increment are a single atomic operation, so concurrent sources never
/// observe the same value.
///
/// ```
/// use andino_protocol::Sequencer;
///
/// let seq = Sequencer::starting_at(0xFFFE);
/// assert_eq!(seq.next(), 0xFFFE);
/// assert_eq!(seq.next(), 0xFFFF);
/// assert_eq!(seq.peek(), 0x0000);
/// ```
#[derive(Debug, Default)]
pub struct Sequencer {
    next: AtomicU16,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(value: u16) -> Self {
        Self {
            next: AtomicU16::new(value),
        }
    }

    /// Take the current value and advance.
    pub fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Value the next broadcast will carry.
    pub fn peek(&self) -> u16 {
        self.next.load(Ordering::Acquire)
    }

    /// Number and format a tagged event.
    pub fn tagged(&self, tag: EventTag, payload: &str) -> String {
        format_tagged(self.next(), tag, payload)
    }

    /// Number and format a generic hardware broadcast.
    pub fn raw(&self, payload: &str) -> String {
        format_raw(self.next(), payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_zero() {
        let seq = Sequencer::new();
        assert_eq!(seq.peek(), 0);
        assert_eq!(seq.raw("{0}"), ":0000{0}");
        assert_eq!(seq.tagged(EventTag::Rfid, "abc"), ":0001@R{abc}");
        assert_eq!(seq.peek(), 2);
    }

    #[test]
    fn test_wraps_after_ffff() {
        let seq = Sequencer::starting_at(0xFFFE);
        seq.next();
        seq.next();
        assert_eq!(seq.peek(), 0x0000);
    }

    #[test]
    fn test_concurrent_sources_get_distinct_values() {
        let seq = Arc::new(Sequencer::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..500).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
        assert_eq!(seq.peek(), 2000);
    }
}
