//! Append-only, chained sample buffers for one metric at one tree node.
//!
//! A `BufferChain` is modeled as the distilled spec's doubly linked list of
//! [`Buffer`] segments, but represented as an owned, ordered `VecDeque`
//! rather than raw `prev`/`next` pointers: Rust ownership makes an
//! intrusive linked list painful for no benefit here, since nothing outside
//! the owning [`crate::level::Level`] slot ever holds a reference into the
//! chain. The externally observable semantics — oldest-to-newest chain
//! order, `prev.start + len(prev.data)*frequency <= this.start`, NaN-padded
//! gaps — are unchanged.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::value::MetricValue;

/// Soft capacity of one buffer segment before a new one is allocated.
pub const BUFFER_CAPACITY: usize = 512;

/// One append-only segment of equally spaced samples.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub start: i64,
    pub frequency: i64,
    pub data: Vec<MetricValue>,
    pub archived: bool,
    pub closed: bool,
}

impl Buffer {
    fn new(start: i64, frequency: i64) -> Self {
        Self {
            start,
            frequency,
            data: Vec::new(),
            archived: false,
            closed: false,
        }
    }

    /// Timestamp of the first slot not yet written.
    pub fn next_expected(&self) -> i64 {
        self.start + self.data.len() as i64 * self.frequency
    }

    /// Timestamp of the last written slot, if any.
    pub fn last_ts(&self) -> Option<i64> {
        if self.data.is_empty() {
            None
        } else {
            Some(self.next_expected() - self.frequency)
        }
    }

    /// Timestamp of the last slot of the segment's data array (may be
    /// unwritten only for an empty segment, which never occurs in practice).
    fn end_ts(&self) -> i64 {
        self.start + (self.data.len().max(1) as i64 - 1) * self.frequency
    }
}

/// The chain of [`Buffer`] segments for one metric at one tree node.
#[derive(Debug, Clone, Default)]
pub struct BufferChain {
    segments: VecDeque<Buffer>,
}

impl BufferChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len_segments(&self) -> usize {
        self.segments.len()
    }

    /// Appends `value` at `ts`. `frequency` must match the chain's existing
    /// frequency (callers thread it from the metric registry; a chain with
    /// no segments yet adopts it for its first segment).
    pub fn write(&mut self, ts: i64, value: MetricValue, frequency: i64) -> Result<()> {
        if self.segments.is_empty() {
            let mut seg = Buffer::new(ts, frequency);
            seg.data.push(value);
            self.segments.push_back(seg);
            return Ok(());
        }

        let head = self.segments.back_mut().expect("checked non-empty above");
        let next_expected = head.next_expected();

        if ts < next_expected {
            if head.last_ts() == Some(ts) {
                // Idempotent retry: overwrite the most recent sample.
                *head.data.last_mut().expect("head has data: last_ts is Some") = value;
                return Ok(());
            }
            return Err(Error::TimestampTooOld {
                ts,
                expected: next_expected,
            });
        }

        if head.data.len() >= BUFFER_CAPACITY {
            let mut seg = Buffer::new(ts, frequency);
            seg.data.push(value);
            self.segments.push_back(seg);
            return Ok(());
        }

        let gap_slots = ((ts - next_expected) / frequency) as usize;
        let room = BUFFER_CAPACITY - head.data.len();
        if gap_slots + 1 <= room {
            for _ in 0..gap_slots {
                head.data.push(MetricValue::NAN);
            }
            head.data.push(value);
        } else {
            let mut seg = Buffer::new(ts, frequency);
            seg.data.push(value);
            self.segments.push_back(seg);
        }

        Ok(())
    }

    /// Reads `[from, to]` at native frequency, NaN-padding gaps between
    /// segments. Returns `(data, actual_from, actual_to)`; the actual range
    /// is clamped to what data actually exists (never padded beyond it).
    pub fn read(&self, from: i64, to: i64) -> (Vec<MetricValue>, i64, i64) {
        let Some(first) = self.segments.front() else {
            return (Vec::new(), from, to);
        };
        let last = self.segments.back().expect("front exists implies back exists");
        let frequency = first.frequency;

        let data_start = first.start;
        let data_end = last.end_ts();

        let actual_from = from.max(data_start);
        let actual_to = to.min(data_end);
        if actual_from > actual_to {
            return (Vec::new(), actual_from, actual_to);
        }

        let n = ((actual_to - actual_from) / frequency + 1) as usize;
        let mut out = vec![MetricValue::NAN; n];

        for seg in &self.segments {
            let seg_end = seg.end_ts();
            let ov_start = seg.start.max(actual_from);
            let ov_end = seg_end.min(actual_to);
            if ov_start > ov_end {
                continue;
            }
            let mut ts = ov_start;
            while ts <= ov_end {
                let seg_idx = ((ts - seg.start) / frequency) as usize;
                let out_idx = ((ts - actual_from) / frequency) as usize;
                out[out_idx] = seg.data[seg_idx];
                ts += frequency;
            }
        }

        (out, actual_from, actual_to)
    }

    /// Applies `f` to every segment overlapping `[from, to]`.
    pub fn iter_from_to(&self, from: i64, to: i64, mut f: impl FnMut(&Buffer)) {
        for seg in &self.segments {
            if seg.end_ts() >= from && seg.start <= to {
                f(seg);
            }
        }
    }

    pub fn iter_segments_mut(&mut self) -> impl Iterator<Item = &mut Buffer> {
        self.segments.iter_mut()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Buffer> {
        self.segments.iter()
    }

    pub fn last_ts(&self) -> Option<i64> {
        self.segments.back().and_then(Buffer::last_ts)
    }

    /// Drops segments whose last timestamp is strictly before `t`. Returns
    /// the number of segments freed.
    pub fn free_before(&mut self, t: i64) -> usize {
        let before = self.segments.len();
        while let Some(front) = self.segments.front() {
            match front.last_ts() {
                Some(last) if last < t => {
                    self.segments.pop_front();
                }
                _ => break,
            }
        }
        before - self.segments.len()
    }

    /// Drops the single oldest segment, if any. Used by cap enforcement.
    pub fn force_free_oldest(&mut self) -> usize {
        if self.segments.pop_front().is_some() {
            1
        } else {
            0
        }
    }

    /// Links an already-archived segment loaded from a checkpoint onto the
    /// chain's current head, NaN-padding the previous head's tail so the
    /// chain invariant holds. A `seg` starting before the existing head is
    /// fatal for the caller's host (mirrors the distilled spec's loader
    /// contract).
    pub fn append_archived_segment(&mut self, seg: Buffer) -> Result<()> {
        if let Some(head) = self.segments.back_mut() {
            if seg.start < head.next_expected() {
                return Err(Error::TimestampTooOld {
                    ts: seg.start,
                    expected: head.next_expected(),
                });
            }
            let gap = ((seg.start - head.next_expected()) / head.frequency) as usize;
            for _ in 0..gap {
                head.data.push(MetricValue::NAN);
            }
        }
        self.segments.push_back(seg);
        Ok(())
    }

    /// Total bytes of sample storage across all segments (used by
    /// [`crate::store::MemoryStore::size_in_bytes`]).
    pub fn size_in_bytes(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.data.len() * std::mem::size_of::<MetricValue>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32) -> MetricValue {
        MetricValue::new(x)
    }

    #[test]
    fn two_sample_write_read() {
        let mut chain = BufferChain::new();
        chain.write(100, v(1.0), 10).unwrap();
        chain.write(110, v(2.0), 10).unwrap();
        let (data, from, to) = chain.read(100, 110);
        assert_eq!(from, 100);
        assert_eq!(to, 110);
        assert_eq!(data, vec![v(1.0), v(2.0)]);
    }

    #[test]
    fn gap_is_nan_padded() {
        let mut chain = BufferChain::new();
        chain.write(100, v(1.0), 10).unwrap();
        chain.write(130, v(2.0), 10).unwrap();
        let (data, from, to) = chain.read(100, 130);
        assert_eq!((from, to), (100, 130));
        assert!(data[1].is_nan());
        assert!(data[2].is_nan());
        assert_eq!(data[0], v(1.0));
        assert_eq!(data[3], v(2.0));
    }

    #[test]
    fn write_before_head_is_rejected() {
        let mut chain = BufferChain::new();
        chain.write(100, v(1.0), 10).unwrap();
        chain.write(110, v(2.0), 10).unwrap();
        let err = chain.write(90, v(9.0), 10).unwrap_err();
        assert_eq!(
            err,
            Error::TimestampTooOld {
                ts: 90,
                expected: 120
            }
        );
    }

    #[test]
    fn equal_timestamp_overwrites_idempotently() {
        let mut chain = BufferChain::new();
        chain.write(100, v(1.0), 10).unwrap();
        chain.write(100, v(42.0), 10).unwrap();
        let (data, _, _) = chain.read(100, 100);
        assert_eq!(data, vec![v(42.0)]);
    }

    #[test]
    fn write_exactly_at_next_slot_does_not_allocate() {
        let mut chain = BufferChain::new();
        chain.write(0, v(1.0), 10).unwrap();
        chain.write(10, v(2.0), 10).unwrap();
        assert_eq!(chain.len_segments(), 1);
    }

    #[test]
    fn overflow_allocates_new_head() {
        let mut chain = BufferChain::new();
        let mut ts = 0i64;
        for i in 0..BUFFER_CAPACITY {
            chain.write(ts, v(i as f32), 10).unwrap();
            ts += 10;
        }
        assert_eq!(chain.len_segments(), 1);
        chain.write(ts, v(999.0), 10).unwrap();
        assert_eq!(chain.len_segments(), 2);
    }

    #[test]
    fn free_before_drops_old_segments() {
        let mut chain = BufferChain::new();
        for i in 0..BUFFER_CAPACITY {
            chain.write(i as i64 * 10, v(i as f32), 10).unwrap();
        }
        chain
            .write(BUFFER_CAPACITY as i64 * 10, v(1.0), 10)
            .unwrap();
        assert_eq!(chain.len_segments(), 2);

        let freed = chain.free_before(BUFFER_CAPACITY as i64 * 10);
        assert_eq!(freed, 1);
        assert_eq!(chain.len_segments(), 1);
    }

    #[test]
    fn force_free_on_empty_chain_returns_zero() {
        let mut chain = BufferChain::new();
        assert_eq!(chain.force_free_oldest(), 0);
    }
}
