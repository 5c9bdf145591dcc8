//! Per-block LUT command buffer pool.
//!
//! Each block with LUTs owns one pool of `request_queue_depth` fixed-capacity
//! buffers. A buffer moves through
//!
//! ```text
//! Free -> Writing -> Committed -> Recycled -> Free
//!            |                        ^
//!            +--(discard)-> Free      +-- last in-flight request released
//! ```
//!
//! A committed buffer becomes eligible for reuse only after it has been
//! recycled *and* every request that referenced it has been acknowledged by
//! the hardware. Fetching never waits: an empty pool is an error.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{BufferId, RequestId};
use crate::types::{BlockType, LutBank};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    Free,
    Writing,
    Committed,
    /// Recycled by the producer but still referenced by in-flight requests
    Recycled,
}

/// Handle to one fetch of a buffer. Stale handles are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LutBufferHandle {
    pub id: BufferId,
    pub generation: u32,
}

/// A sealed buffer ready for submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedLut {
    pub handle: LutBufferHandle,
    /// Words written
    pub len: usize,
    /// Bank the content was computed for
    pub bank: LutBank,
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub free: usize,
    pub in_use: usize,
    pub peak_in_use: usize,
    pub fetches: u64,
    pub exhaustions: u64,
    pub recycles: u64,
}

#[derive(Debug)]
struct Slot {
    words: Vec<u32>,
    state: BufferState,
    generation: u32,
    len: usize,
    in_flight: BTreeSet<RequestId>,
}

#[derive(Debug)]
pub struct LutBufferPool {
    block: BlockType,
    slots: Vec<Slot>,
    buffer_words: usize,
    peak_in_use: usize,
    fetches: u64,
    exhaustions: u64,
    recycles: u64,
}

impl LutBufferPool {
    /// Pool of `depth` buffers of `buffer_words` words each
    pub fn new(block: BlockType, depth: usize, buffer_words: usize) -> Self {
        let slots = (0..depth)
            .map(|_| Slot {
                words: vec![0; buffer_words],
                state: BufferState::Free,
                generation: 0,
                len: 0,
                in_flight: BTreeSet::new(),
            })
            .collect();
        tracing::trace!(
            "{}: LUT pool of {} x {} words",
            block,
            depth,
            buffer_words
        );
        Self {
            block,
            slots,
            buffer_words,
            peak_in_use: 0,
            fetches: 0,
            exhaustions: 0,
            recycles: 0,
        }
    }

    /// Recycle `previous` (if any), then take a free buffer.
    pub fn fetch(&mut self, previous: Option<LutBufferHandle>) -> PipelineResult<LutBufferHandle> {
        if let Some(previous) = previous {
            self.recycle(previous)?;
        }

        let Some(index) = self
            .slots
            .iter()
            .position(|s| s.state == BufferState::Free)
        else {
            self.exhaustions += 1;
            tracing::error!(
                "{}: LUT buffer pool exhausted ({} buffers in flight)",
                self.block,
                self.slots.len()
            );
            return Err(PipelineError::BufferExhausted {
                block: self.block,
                capacity: self.slots.len(),
            });
        };

        let slot = &mut self.slots[index];
        slot.state = BufferState::Writing;
        slot.generation = slot.generation.wrapping_add(1);
        slot.len = 0;
        let handle = LutBufferHandle {
            id: BufferId(index as u32),
            generation: slot.generation,
        };

        self.fetches += 1;
        self.peak_in_use = self.peak_in_use.max(self.in_use());
        Ok(handle)
    }

    /// Writable region of exactly `len` words
    pub fn begin_write(&mut self, handle: LutBufferHandle, len: usize) -> PipelineResult<&mut [u32]> {
        if len > self.buffer_words {
            return Err(PipelineError::WriteOverflow {
                block: self.block,
                requested: len,
                capacity: self.buffer_words,
            });
        }
        let slot = self.slot_in_state(handle, BufferState::Writing)?;
        slot.len = len;
        Ok(&mut slot.words[..len])
    }

    /// Seal a written buffer
    pub fn commit(&mut self, handle: LutBufferHandle, bank: LutBank) -> PipelineResult<CommittedLut> {
        let slot = self.slot_in_state(handle, BufferState::Writing)?;
        slot.state = BufferState::Committed;
        Ok(CommittedLut {
            handle,
            len: slot.len,
            bank,
        })
    }

    /// Return a fetched but never committed buffer
    pub fn discard(&mut self, handle: LutBufferHandle) -> PipelineResult<()> {
        let slot = self.slot_in_state(handle, BufferState::Writing)?;
        slot.state = BufferState::Free;
        slot.len = 0;
        Ok(())
    }

    /// Return every buffer still being written to the pool. Returns the number
    /// of buffers reclaimed.
    pub fn reclaim_writing(&mut self) -> usize {
        let mut reclaimed = 0;
        for slot in &mut self.slots {
            if slot.state == BufferState::Writing {
                slot.state = BufferState::Free;
                slot.len = 0;
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Mark a committed buffer eligible for reuse once no in-flight request
    /// references it
    pub fn recycle(&mut self, handle: LutBufferHandle) -> PipelineResult<()> {
        let block = self.block;
        let slot = self.slot_in_state(handle, BufferState::Committed)?;
        slot.state = if slot.in_flight.is_empty() {
            BufferState::Free
        } else {
            tracing::trace!(
                "{}: buffer {:?} recycled with {} request(s) in flight",
                block,
                handle.id,
                slot.in_flight.len()
            );
            BufferState::Recycled
        };
        self.recycles += 1;
        Ok(())
    }

    /// Record that `request` was submitted referencing a committed buffer
    pub fn mark_in_flight(&mut self, handle: LutBufferHandle, request: RequestId) -> PipelineResult<()> {
        let slot = self.slot_in_state(handle, BufferState::Committed)?;
        slot.in_flight.insert(request);
        Ok(())
    }

    /// Hardware is done with `request`. Returns the number of buffers freed.
    pub fn release_request(&mut self, request: RequestId) -> usize {
        let mut freed = 0;
        for slot in &mut self.slots {
            if slot.in_flight.remove(&request)
                && slot.in_flight.is_empty()
                && slot.state == BufferState::Recycled
            {
                slot.state = BufferState::Free;
                freed += 1;
            }
        }
        freed
    }

    /// Committed content of a buffer
    pub fn words(&self, handle: LutBufferHandle) -> Option<&[u32]> {
        let slot = self.slots.get(handle.id.index())?;
        (slot.generation == handle.generation
            && matches!(slot.state, BufferState::Committed | BufferState::Recycled))
        .then(|| &slot.words[..slot.len])
    }

    pub fn state(&self, id: BufferId) -> Option<BufferState> {
        self.slots.get(id.index()).map(|s| s.state)
    }

    /// Number of in-flight requests referencing a buffer
    pub fn references(&self, id: BufferId) -> usize {
        self.slots.get(id.index()).map_or(0, |s| s.in_flight.len())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn buffer_words(&self) -> usize {
        self.buffer_words
    }

    fn free_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == BufferState::Free)
            .count()
    }

    fn in_use(&self) -> usize {
        self.slots.len() - self.free_count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.slots.len(),
            free: self.free_count(),
            in_use: self.in_use(),
            peak_in_use: self.peak_in_use,
            fetches: self.fetches,
            exhaustions: self.exhaustions,
            recycles: self.recycles,
        }
    }

    fn slot_in_state(
        &mut self,
        handle: LutBufferHandle,
        expected: BufferState,
    ) -> PipelineResult<&mut Slot> {
        let block = self.block;
        let slot = self
            .slots
            .get_mut(handle.id.index())
            .ok_or_else(|| PipelineError::InvalidBufferState {
                block,
                message: format!("{:?} out of range", handle.id),
            })?;
        if slot.generation != handle.generation {
            return Err(PipelineError::InvalidBufferState {
                block,
                message: format!(
                    "stale handle {:?} gen {} (current gen {})",
                    handle.id, handle.generation, slot.generation
                ),
            });
        }
        if slot.state != expected {
            return Err(PipelineError::InvalidBufferState {
                block,
                message: format!(
                    "{:?} is {:?}, expected {:?}",
                    handle.id, slot.state, expected
                ),
            });
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool(depth: usize) -> LutBufferPool {
        LutBufferPool::new(BlockType::Abf, depth, 16)
    }

    fn fill_and_commit(pool: &mut LutBufferPool, handle: LutBufferHandle, value: u32) -> CommittedLut {
        pool.begin_write(handle, 8).unwrap().fill(value);
        pool.commit(handle, LutBank::Bank0).unwrap()
    }

    #[test]
    fn test_fetch_write_commit() {
        let mut pool = pool(2);
        let h = pool.fetch(None).unwrap();
        let lut = fill_and_commit(&mut pool, h, 7);
        assert_eq!(lut.len, 8);
        assert_eq!(pool.words(h).unwrap(), &[7; 8]);
        assert_eq!(pool.state(h.id), Some(BufferState::Committed));

        // Committed buffers are read-only
        assert!(pool.begin_write(h, 4).is_err());
    }

    #[test]
    fn test_write_overflow() {
        let mut pool = pool(1);
        let h = pool.fetch(None).unwrap();
        assert!(matches!(
            pool.begin_write(h, 17),
            Err(PipelineError::WriteOverflow {
                requested: 17,
                capacity: 16,
                ..
            })
        ));
        assert_eq!(pool.begin_write(h, 16).unwrap().len(), 16);
    }

    #[test]
    fn test_exhaustion_is_error() {
        let mut pool = pool(1);
        let h = pool.fetch(None).unwrap();
        fill_and_commit(&mut pool, h, 1);
        pool.mark_in_flight(h, RequestId(1)).unwrap();

        assert!(matches!(
            pool.fetch(Some(h)),
            Err(PipelineError::BufferExhausted { capacity: 1, .. })
        ));
        assert_eq!(pool.state(h.id), Some(BufferState::Recycled));
        assert_eq!(pool.stats().exhaustions, 1);

        assert_eq!(pool.release_request(RequestId(1)), 1);
        assert_eq!(pool.state(h.id), Some(BufferState::Free));
        assert!(pool.fetch(None).is_ok());
    }

    #[test]
    fn test_recycle_without_refs_frees() {
        let mut pool = pool(1);
        let h = pool.fetch(None).unwrap();
        fill_and_commit(&mut pool, h, 1);
        let next = pool.fetch(Some(h)).unwrap();
        assert_eq!(next.id, h.id);
        assert_ne!(next.generation, h.generation);

        // The old handle is stale now
        assert!(pool.recycle(h).is_err());
        assert!(pool.words(h).is_none());
    }

    #[test]
    fn test_release_before_recycle_keeps_committed() {
        let mut pool = pool(2);
        let h = pool.fetch(None).unwrap();
        fill_and_commit(&mut pool, h, 1);
        pool.mark_in_flight(h, RequestId(1)).unwrap();
        pool.release_request(RequestId(1));
        assert_eq!(pool.state(h.id), Some(BufferState::Committed));
    }

    #[test]
    fn test_multiple_requests_reference_one_buffer() {
        let mut pool = pool(2);
        let h = pool.fetch(None).unwrap();
        fill_and_commit(&mut pool, h, 1);
        pool.mark_in_flight(h, RequestId(1)).unwrap();
        pool.mark_in_flight(h, RequestId(2)).unwrap();
        assert_eq!(pool.references(h.id), 2);

        pool.recycle(h).unwrap();
        assert_eq!(pool.release_request(RequestId(1)), 0);
        assert_eq!(pool.state(h.id), Some(BufferState::Recycled));
        assert_eq!(pool.release_request(RequestId(2)), 1);
        assert_eq!(pool.state(h.id), Some(BufferState::Free));
    }

    #[test]
    fn test_discard_returns_unused() {
        let mut pool = pool(1);
        let h = pool.fetch(None).unwrap();
        pool.begin_write(h, 4).unwrap();
        pool.discard(h).unwrap();
        assert_eq!(pool.stats().free, 1);
        assert!(pool.commit(h, LutBank::Bank0).is_err());
    }

    #[test]
    fn test_reclaim_writing_frees_abandoned_buffers() {
        let mut pool = pool(3);
        let committed = pool.fetch(None).unwrap();
        fill_and_commit(&mut pool, committed, 1);
        let abandoned = pool.fetch(None).unwrap();
        pool.begin_write(abandoned, 4).unwrap();

        assert_eq!(pool.reclaim_writing(), 1);
        assert_eq!(pool.state(abandoned.id), Some(BufferState::Free));
        assert_eq!(pool.state(committed.id), Some(BufferState::Committed));
        assert!(pool.commit(abandoned, LutBank::Bank0).is_err());
        assert_eq!(pool.reclaim_writing(), 0);
    }

    #[test]
    fn test_stats() {
        let mut pool = pool(3);
        let a = pool.fetch(None).unwrap();
        let _b = pool.fetch(None).unwrap();
        pool.discard(a).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.free, 2);
        assert_eq!(stats.peak_in_use, 2);
        assert_eq!(stats.fetches, 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Produce,
        Submit(u8),
        Ack(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Produce),
            (0u8..6).prop_map(Op::Submit),
            (0u8..6).prop_map(Op::Ack),
        ]
    }

    proptest! {
        /// A fetched buffer is never one still referenced by an unacknowledged
        /// request, and never one committed but not yet recycled.
        #[test]
        fn prop_fetch_never_returns_live_buffer(ops in prop::collection::vec(op(), 1..64)) {
            let mut pool = pool(3);
            let mut current: Option<LutBufferHandle> = None;

            for op in ops {
                match op {
                    Op::Produce => {
                        let live_before: Vec<BufferId> = (0..3u32)
                            .map(BufferId)
                            .filter(|&id| {
                                pool.references(id) > 0
                                    || (pool.state(id) == Some(BufferState::Committed)
                                        && Some(id) != current.map(|h| h.id))
                            })
                            .collect();
                        match pool.fetch(current) {
                            Ok(h) => {
                                prop_assert!(!live_before.contains(&h.id));
                                prop_assert_eq!(pool.references(h.id), 0);
                                pool.begin_write(h, 4).unwrap();
                                current = Some(pool.commit(h, LutBank::Bank0).unwrap().handle);
                            }
                            Err(PipelineError::BufferExhausted { .. }) => {
                                current = None;
                            }
                            Err(e) => prop_assert!(false, "unexpected error {e}"),
                        }
                    }
                    Op::Submit(r) => {
                        if let Some(h) = current {
                            pool.mark_in_flight(h, RequestId(r as u64)).unwrap();
                        }
                    }
                    Op::Ack(r) => {
                        pool.release_request(RequestId(r as u64));
                    }
                }
                let stats = pool.stats();
                prop_assert_eq!(stats.free + stats.in_use, stats.capacity);
            }
        }
    }
}
