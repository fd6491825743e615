//! Per-device pool of outstanding command frames.
//!
//! Each slot tracks one ATA command that has been (or is about to be) sent to the target. A slot
//! is free when its tag is [`FREETAG`]. Free slots are kept on a stack so allocation is `O(1)`,
//! and the slot index lives in the low 16 bits of every tag so a response's frame can be found
//! without a scan.

use crate::{AtaHeader, fmt};
use alloc::vec::Vec;

/// Tag of a free frame slot.
pub(crate) const FREETAG: u32 = 0xffff_ffff;

/// The high bit of a tag is never set by this initiator, so `FREETAG` can't collide with a live
/// tag. Responses with it set belong to someone else.
const SEQUENCE_MASK: u16 = 0x7fff;

/// A single command slot.
#[derive(Debug)]
pub(crate) struct Frame {
    /// Tag of the frame on the wire, or [`FREETAG`].
    pub(crate) tag: u32,
    /// When the frame was last transmitted, in microseconds.
    pub(crate) sent_at: u64,
    /// Time accumulated waiting for a response over all retransmissions, in microseconds.
    pub(crate) waited: u64,
    /// The buf this frame moves data for. `None` for IDENTIFY.
    pub(crate) buf: Option<usize>,
    /// Segment index within the buf's request.
    pub(crate) segment: usize,
    /// Byte offset within the segment.
    pub(crate) offset: usize,
    /// Bytes of sector data carried by this frame.
    pub(crate) len: usize,
    /// ATA header sent with this frame, kept for retransmission.
    pub(crate) ata: AtaHeader,
    /// Write payload, kept for retransmission.
    pub(crate) write_data: Vec<u8>,
}

impl Frame {
    fn new() -> Self {
        Self {
            tag: FREETAG,
            sent_at: 0,
            waited: 0,
            buf: None,
            segment: 0,
            offset: 0,
            len: 0,
            ata: AtaHeader::default(),
            write_data: Vec::new(),
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        self.tag == FREETAG
    }
}

#[derive(Debug)]
pub(crate) struct FramePool {
    frames: Vec<Frame>,
    /// Free slot indices. Popped from the end.
    free: Vec<u16>,
    /// Last sequence number used in a tag.
    sequence: u16,
}

impl FramePool {
    /// Create a pool of `nframes` free slots.
    pub(crate) fn new(nframes: u16) -> Self {
        Self {
            frames: (0..nframes).map(|_| Frame::new()).collect(),
            // Reversed so slot 0 is handed out first.
            free: (0..nframes).rev().collect(),
            sequence: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames currently in use.
    pub(crate) fn outstanding(&self) -> usize {
        self.frames.len() - self.free.len()
    }

    pub(crate) fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    /// Claim a free slot and give it a fresh tag.
    pub(crate) fn alloc(&mut self) -> Option<u16> {
        let slot = self.free.pop()?;

        let tag = self.next_tag(slot);

        let frame = &mut self.frames[usize::from(slot)];

        fmt::debug_assert!(frame.is_free(), "slot {} on free list but in use", slot);

        frame.tag = tag;
        frame.sent_at = 0;
        frame.waited = 0;
        frame.buf = None;
        frame.segment = 0;
        frame.offset = 0;
        frame.len = 0;
        frame.write_data.clear();

        Some(slot)
    }

    /// Give an in-use frame a new tag so late responses to the previous transmission are
    /// discarded. Returns the new tag.
    pub(crate) fn retag(&mut self, slot: u16) -> u32 {
        let tag = self.next_tag(slot);

        self.frames[usize::from(slot)].tag = tag;

        tag
    }

    /// Find the in-use slot whose current tag is `tag`.
    pub(crate) fn find(&self, tag: u32) -> Option<u16> {
        if tag == FREETAG {
            return None;
        }

        let slot = (tag & 0xffff) as u16;

        self.frames
            .get(usize::from(slot))
            .filter(|frame| frame.tag == tag)
            .map(|_| slot)
    }

    /// Return a slot to the free list.
    pub(crate) fn release(&mut self, slot: u16) {
        let frame = &mut self.frames[usize::from(slot)];

        if frame.is_free() {
            fmt::error!("Double release of frame slot {}", slot);

            return;
        }

        frame.tag = FREETAG;
        frame.buf = None;
        frame.write_data = Vec::new();

        self.free.push(slot);
    }

    /// Release every in-use slot.
    pub(crate) fn release_all(&mut self) {
        for slot in self.busy_slots() {
            self.release(slot);
        }
    }

    pub(crate) fn frame(&self, slot: u16) -> &Frame {
        &self.frames[usize::from(slot)]
    }

    pub(crate) fn frame_mut(&mut self, slot: u16) -> &mut Frame {
        &mut self.frames[usize::from(slot)]
    }

    /// Indices of all in-use slots.
    pub(crate) fn busy_slots(&self) -> Vec<u16> {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| !frame.is_free())
            .map(|(slot, _)| slot as u16)
            .collect()
    }

    fn next_tag(&mut self, slot: u16) -> u32 {
        self.sequence = self.sequence.wrapping_add(1) & SEQUENCE_MASK;

        (u32::from(self.sequence) << 16) | u32::from(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_spare_frames() {
        crate::test_logger();

        let mut pool = FramePool::new(4);

        for _ in 0..4 {
            assert!(pool.alloc().is_some());
        }

        assert!(!pool.has_free());
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.outstanding(), 4);
    }

    #[test]
    fn release_makes_slot_available() {
        crate::test_logger();

        let mut pool = FramePool::new(2);

        let a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();

        pool.release(a);

        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.alloc(), Some(a));
    }

    #[test]
    fn live_tags_are_unique() {
        crate::test_logger();

        let mut pool = FramePool::new(16);

        let slots = (0..16).map(|_| pool.alloc().unwrap()).collect::<Vec<_>>();

        let mut tags = slots
            .iter()
            .map(|slot| pool.frame(*slot).tag)
            .collect::<Vec<_>>();

        tags.sort_unstable();
        tags.dedup();

        assert_eq!(tags.len(), 16);
        assert!(tags.iter().all(|tag| *tag != FREETAG && tag & (1 << 31) == 0));

        for slot in slots {
            assert_eq!(pool.find(pool.frame(slot).tag), Some(slot));
        }
    }

    #[test]
    fn stale_tag_after_retag() {
        crate::test_logger();

        let mut pool = FramePool::new(2);

        let slot = pool.alloc().unwrap();
        let old = pool.frame(slot).tag;
        let new = pool.retag(slot);

        assert_ne!(old, new);
        assert_eq!(pool.find(old), None);
        assert_eq!(pool.find(new), Some(slot));
    }

    #[test]
    fn freetag_never_matches() {
        crate::test_logger();

        let mut pool = FramePool::new(1);

        assert_eq!(pool.find(FREETAG), None);

        let slot = pool.alloc().unwrap();
        let tag = pool.frame(slot).tag;

        pool.release(slot);

        assert_eq!(pool.find(tag), None);
        assert_eq!(pool.find(0x0001_00ff), None);
    }

    #[test]
    fn release_all() {
        crate::test_logger();

        let mut pool = FramePool::new(3);

        pool.alloc();
        pool.alloc();

        pool.release_all();

        assert_eq!(pool.outstanding(), 0);
        assert!(pool.busy_slots().is_empty());
    }
}
