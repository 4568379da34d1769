//! Segmented memory for the Universal Machine.
//!
//! Memory is a table of independently sized word arrays addressed by a
//! segment identifier. Identifier 0 always holds the running program.
//! Unmapped identifiers stay in the table as vacant slots and are queued
//! for reuse, oldest first; a fresh identifier is only minted (equal to
//! the current table length) when no vacant one is waiting.

use crate::cpu::decode::Word;
use serde::{Serialize, Deserialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Key into the segment table.
pub type SegmentId = Word;

/// Identifier of the executing program.
pub const PROGRAM_SEGMENT: SegmentId = 0;

/// A fixed-length block of words.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Segment {
    words: Box<[Word]>,
}

impl Segment {
    /// A zero-filled segment of `len` words.
    pub fn zeroed(len: usize) -> Self {
        Self { words: vec![0; len].into_boxed_slice() }
    }

    pub fn from_words(words: Vec<Word>) -> Self {
        Self { words: words.into_boxed_slice() }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, offset: Word) -> Option<Word> {
        self.words.get(offset as usize).copied()
    }

    fn slot_mut(&mut self, offset: Word) -> Option<&mut Word> {
        self.words.get_mut(offset as usize)
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.words
    }
}

/// The segment table plus its queue of reusable identifiers.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    segments: Vec<Option<Segment>>,
    free: VecDeque<SegmentId>,
}

impl Memory {
    /// Memory with an empty program segment.
    pub fn new() -> Self {
        Self::with_program(Vec::new())
    }

    /// Memory whose segment 0 holds `program`.
    pub fn with_program(program: Vec<Word>) -> Self {
        Self {
            segments: vec![Some(Segment::from_words(program))],
            free: VecDeque::new(),
        }
    }

    /// Map a new zero-filled segment of `size` words.
    ///
    /// The oldest vacated identifier is reused if there is one; otherwise
    /// the table grows by one slot.
    pub fn allocate(&mut self, size: Word) -> SegmentId {
        let segment = Segment::zeroed(size as usize);

        if let Some(id) = self.free.pop_front() {
            self.segments[id as usize] = Some(segment);
            id
        } else {
            let id = self.segments.len() as SegmentId;
            self.segments.push(Some(segment));
            id
        }
    }

    /// Unmap segment `id` and queue the identifier for reuse.
    pub fn deallocate(&mut self, id: SegmentId) -> Result<(), MemoryError> {
        if id == PROGRAM_SEGMENT {
            return Err(MemoryError::ProgramSegmentUnmap);
        }
        let slot = self.segments
            .get_mut(id as usize)
            .ok_or(MemoryError::UnmappedSegment(id))?;
        if slot.take().is_none() {
            return Err(MemoryError::UnmappedSegment(id));
        }
        self.free.push_back(id);
        Ok(())
    }

    pub fn read(&self, id: SegmentId, offset: Word) -> Result<Word, MemoryError> {
        let segment = self.segment(id).ok_or(MemoryError::UnmappedSegment(id))?;
        segment.get(offset).ok_or(MemoryError::OffsetOutOfBounds {
            segment: id,
            offset,
            len: segment.len(),
        })
    }

    pub fn write(&mut self, id: SegmentId, offset: Word, value: Word) -> Result<(), MemoryError> {
        let segment = self.segments
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(MemoryError::UnmappedSegment(id))?;
        let len = segment.len();
        let slot = segment.slot_mut(offset).ok_or(MemoryError::OffsetOutOfBounds {
            segment: id,
            offset,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Independent copy of segment `id`.
    pub fn duplicate(&self, id: SegmentId) -> Result<Segment, MemoryError> {
        self.segment(id)
            .cloned()
            .ok_or(MemoryError::UnmappedSegment(id))
    }

    /// Bind `program` as segment 0, dropping the previous program.
    ///
    /// Identifier 0 never passes through the free queue.
    pub fn replace_program(&mut self, program: Segment) {
        match self.segments.first_mut() {
            Some(slot) => *slot = Some(program),
            None => self.segments.push(Some(program)),
        }
    }

    /// Release every segment and forget all identifiers.
    pub fn teardown(&mut self) {
        self.segments.clear();
        self.free.clear();
    }

    /// The segment bound to `id`, if any.
    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id as usize).and_then(Option::as_ref)
    }

    /// Words of segment 0; empty after teardown.
    pub fn program(&self) -> &[Word] {
        self.segment(PROGRAM_SEGMENT)
            .map(Segment::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_mapped(&self, id: SegmentId) -> bool {
        self.segment(id).is_some()
    }

    /// Number of identifiers ever issued, vacant ones included.
    pub fn table_len(&self) -> usize {
        self.segments.len()
    }

    /// Number of live segments, segment 0 included.
    pub fn mapped_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_some()).count()
    }

    /// Vacant identifiers in the order they will be reused.
    pub fn free_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.free.iter().copied()
    }

    /// `(id, length)` for every slot; `None` marks a vacant slot.
    pub fn dump(&self) -> Vec<(SegmentId, Option<usize>)> {
        self.segments
            .iter()
            .enumerate()
            .map(|(id, seg)| (id as SegmentId, seg.as_ref().map(Segment::len)))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("table_len", &self.table_len())
            .field("mapped", &self.mapped_count())
            .field("free", &self.free.len())
            .field("program_len", &self.program().len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("segment {0} is not mapped")]
    UnmappedSegment(SegmentId),

    #[error("offset {offset} out of bounds for segment {segment} (length {len})")]
    OffsetOutOfBounds { segment: SegmentId, offset: Word, len: usize },

    #[error("segment 0 holds the program and cannot be unmapped")]
    ProgramSegmentUnmap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed() {
        let mut mem = Memory::new();
        let id = mem.allocate(4);

        assert_eq!(id, 1);
        assert_eq!(mem.segment(id).unwrap().as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_read_write() {
        let mut mem = Memory::new();
        let id = mem.allocate(3);

        mem.write(id, 2, 99).unwrap();
        assert_eq!(mem.read(id, 2).unwrap(), 99);
        assert_eq!(mem.read(id, 0).unwrap(), 0);
    }

    #[test]
    fn test_bounds() {
        let mut mem = Memory::with_program(vec![7]);
        let id = mem.allocate(2);

        assert_eq!(mem.read(0, 0), Ok(7));
        assert_eq!(
            mem.read(id, 2),
            Err(MemoryError::OffsetOutOfBounds { segment: id, offset: 2, len: 2 })
        );
        assert_eq!(mem.write(5, 0, 1), Err(MemoryError::UnmappedSegment(5)));
        assert_eq!(mem.read(u32::MAX, 0), Err(MemoryError::UnmappedSegment(u32::MAX)));
    }

    #[test]
    fn test_zero_length_segment() {
        let mut mem = Memory::new();
        let id = mem.allocate(0);

        assert!(mem.is_mapped(id));
        assert!(mem.read(id, 0).is_err());
    }

    #[test]
    fn test_fifo_reuse() {
        let mut mem = Memory::new();
        let ids: Vec<_> = (0..4).map(|_| mem.allocate(1)).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        mem.deallocate(3).unwrap();
        mem.deallocate(1).unwrap();
        mem.deallocate(4).unwrap();
        assert_eq!(mem.free_ids().collect::<Vec<_>>(), vec![3, 1, 4]);

        assert_eq!(mem.allocate(1), 3);
        assert_eq!(mem.allocate(1), 1);
        assert_eq!(mem.allocate(1), 4);
        // Queue drained: mint fresh.
        assert_eq!(mem.allocate(1), 5);
        assert_eq!(mem.table_len(), 6);
    }

    #[test]
    fn test_vacant_slot_is_retained() {
        let mut mem = Memory::new();
        let id = mem.allocate(8);
        mem.deallocate(id).unwrap();

        assert_eq!(mem.table_len(), 2);
        assert!(!mem.is_mapped(id));
        assert_eq!(mem.dump(), vec![(0, Some(0)), (1, None)]);
    }

    #[test]
    fn test_reused_segment_is_rezeroed() {
        let mut mem = Memory::new();
        let id = mem.allocate(2);
        mem.write(id, 1, 5).unwrap();
        mem.deallocate(id).unwrap();

        let again = mem.allocate(3);
        assert_eq!(again, id);
        assert_eq!(mem.segment(again).unwrap().as_slice(), &[0, 0, 0]);
    }

    #[test]
    fn test_deallocate_contract() {
        let mut mem = Memory::new();
        assert_eq!(mem.deallocate(0), Err(MemoryError::ProgramSegmentUnmap));
        assert_eq!(mem.deallocate(1), Err(MemoryError::UnmappedSegment(1)));

        let id = mem.allocate(1);
        mem.deallocate(id).unwrap();
        assert_eq!(mem.deallocate(id), Err(MemoryError::UnmappedSegment(id)));
        assert_eq!(mem.free_ids().count(), 1);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut mem = Memory::new();
        let id = mem.allocate(2);
        mem.write(id, 0, 11).unwrap();

        let copy = mem.duplicate(id).unwrap();
        mem.write(id, 0, 22).unwrap();

        assert_eq!(copy.as_slice(), &[11, 0]);
        assert_eq!(mem.read(id, 0).unwrap(), 22);
    }

    #[test]
    fn test_replace_program() {
        let mut mem = Memory::with_program(vec![1, 2, 3]);
        let id = mem.allocate(1);
        mem.write(id, 0, 42).unwrap();

        let copy = mem.duplicate(id).unwrap();
        mem.replace_program(copy);

        assert_eq!(mem.program(), &[42]);
        assert_eq!(mem.table_len(), 2);
        assert_eq!(mem.free_ids().count(), 0);
    }

    #[test]
    fn test_teardown() {
        let mut mem = Memory::with_program(vec![1]);
        let id = mem.allocate(1);
        mem.allocate(1);
        mem.deallocate(id).unwrap();

        mem.teardown();

        assert_eq!(mem.table_len(), 0);
        assert_eq!(mem.mapped_count(), 0);
        assert_eq!(mem.free_ids().count(), 0);
        assert!(mem.program().is_empty());
    }
}
