//! Set-Associative Cache State Model.
//!
//! This module models the contents of one cache as seen by the coherency checker: a
//! contiguous `sets × ways` array of line records, each holding a tag, a full line of data
//! and a MOESI state. It provides:
//! 1. **Lookup:** Tag match over the valid ways of the target set.
//! 2. **Allocation:** First-free-way placement; a full set is a hard `SetFull` failure.
//! 3. **Slot writes:** Direct updates of one (set, way) slot, used by log replay.
//! 4. **Outstanding markers:** Addresses with an in-flight snoop in the external simulator.
//!
//! No replacement policy is modeled; lines are never evicted.

/// Persisted `.mem` artifacts for cache contents.
pub mod persist;
/// MOESI states and the compatibility relation.
pub mod state;

use std::collections::BTreeSet;

use self::state::LineState;
use crate::common::addr::AddressLayout;
use crate::common::error::CacheError;

/// One (set, way) slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheLine {
    /// Stored tag (upper `tag_bits` of the address).
    pub tag: u64,
    /// Line data, `cacheline_bytes` long.
    pub data: Vec<u8>,
    /// MOESI state; `Invalid` slots are free.
    pub state: LineState,
}

/// Result of a successful [`CacheArray::lookup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit<'a> {
    /// Line data.
    pub data: &'a [u8],
    /// Line state (never `Invalid`).
    pub state: LineState,
    /// Set index.
    pub set: usize,
    /// Way index.
    pub way: usize,
}

/// Partial update of one slot; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotUpdate {
    /// New tag.
    pub tag: Option<u64>,
    /// New state.
    pub state: Option<LineState>,
    /// New line data.
    pub data: Option<Vec<u8>>,
}

/// Contents of one cache owned by one bus master.
#[derive(Clone, Debug)]
pub struct CacheArray {
    layout: AddressLayout,
    ways: usize,
    lines: Vec<CacheLine>,
    outstanding: BTreeSet<u64>,
}

impl CacheArray {
    /// Creates an empty cache: every slot `Invalid` with zero tag and data.
    ///
    /// # Arguments
    ///
    /// * `layout` - Address layout fixing the set count and line size.
    /// * `ways` - Associativity.
    pub fn new(layout: AddressLayout, ways: usize) -> Self {
        let empty = CacheLine {
            tag: 0,
            data: vec![0; layout.cacheline_bytes()],
            state: LineState::Invalid,
        };
        Self {
            layout,
            ways,
            lines: vec![empty; layout.sets() * ways],
            outstanding: BTreeSet::new(),
        }
    }

    /// Address layout of this cache.
    pub const fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// Number of sets.
    pub const fn sets(&self) -> usize {
        self.layout.sets()
    }

    /// Associativity.
    pub const fn ways(&self) -> usize {
        self.ways
    }

    /// Set index of `addr`.
    #[inline]
    pub const fn index(&self, addr: u64) -> usize {
        self.layout.index(addr)
    }

    /// Returns the slot at `(set, way)`, if inside the geometry.
    pub fn line(&self, set: usize, way: usize) -> Option<&CacheLine> {
        if set >= self.sets() || way >= self.ways {
            return None;
        }
        self.lines.get(set * self.ways + way)
    }

    /// The ways of one set, in way order.
    fn set_lines(&self, set: usize) -> &[CacheLine] {
        let base = set * self.ways;
        &self.lines[base..base + self.ways]
    }

    /// First way of `set` whose VALID bit is clear.
    pub fn free_way(&self, set: usize) -> Option<usize> {
        if set >= self.sets() {
            return None;
        }
        self.set_lines(set)
            .iter()
            .position(|line| !line.state.is_valid())
    }

    /// Finds a valid line whose tag matches `addr` in its set.
    ///
    /// Returns the first matching way; duplicate tags are not rejected.
    pub fn lookup(&self, addr: u64) -> Option<Hit<'_>> {
        let set = self.index(addr);
        let tag = self.layout.tag(addr);
        self.set_lines(set)
            .iter()
            .enumerate()
            .find(|(_, line)| line.state.is_valid() && line.tag == tag)
            .map(|(way, line)| Hit {
                data: &line.data,
                state: line.state,
                set,
                way,
            })
    }

    /// Writes a line for `addr` into the first free way of its set.
    ///
    /// # Arguments
    ///
    /// * `addr` - Any address within the line.
    /// * `data` - Exactly `cacheline_bytes` of data.
    /// * `state` - State to store.
    ///
    /// # Errors
    ///
    /// [`CacheError::SetFull`] when no way is free (nothing is evicted),
    /// [`CacheError::InvalidFill`] for `LineState::Invalid`, or
    /// [`CacheError::LineSize`] when `data` has the wrong length. The array is unchanged
    /// on error.
    pub fn allocate(&mut self, addr: u64, data: &[u8], state: LineState) -> Result<usize, CacheError> {
        if !state.is_valid() {
            return Err(CacheError::InvalidFill { addr });
        }
        self.check_len(data.len())?;
        let set = self.index(addr);
        let way = self.free_way(set).ok_or(CacheError::SetFull { set })?;
        let line = &mut self.lines[set * self.ways + way];
        line.tag = self.layout.tag(addr);
        line.data.copy_from_slice(data);
        line.state = state;
        Ok(way)
    }

    /// Applies a partial update to one slot.
    ///
    /// # Errors
    ///
    /// [`CacheError::SlotOutOfRange`] for a slot outside the geometry, or
    /// [`CacheError::LineSize`] for data of the wrong length. The slot is unchanged on error.
    pub fn write_slot(&mut self, set: usize, way: usize, update: SlotUpdate) -> Result<(), CacheError> {
        if set >= self.sets() || way >= self.ways {
            return Err(CacheError::SlotOutOfRange { set, way });
        }
        if let Some(data) = &update.data {
            self.check_len(data.len())?;
        }
        let line = &mut self.lines[set * self.ways + way];
        if let Some(tag) = update.tag {
            line.tag = tag;
        }
        if let Some(state) = update.state {
            line.state = state;
        }
        if let Some(data) = update.data {
            line.data = data;
        }
        Ok(())
    }

    const fn check_len(&self, got: usize) -> Result<(), CacheError> {
        let expected = self.layout.cacheline_bytes();
        if got == expected {
            Ok(())
        } else {
            Err(CacheError::LineSize { expected, got })
        }
    }

    /// Iterates `(set, way, line)` over valid slots in set-major order.
    pub fn valid_lines(&self) -> impl Iterator<Item = (usize, usize, &CacheLine)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.state.is_valid())
            .map(move |(idx, line)| (idx / self.ways, idx % self.ways, line))
    }

    /// Marks the line containing `addr` as involved in an in-flight transaction.
    pub fn mark_outstanding(&mut self, addr: u64) {
        let _ = self.outstanding.insert(self.layout.line_base(addr));
    }

    /// Clears the outstanding marker of the line containing `addr`.
    pub fn retire_outstanding(&mut self, addr: u64) {
        let _ = self.outstanding.remove(&self.layout.line_base(addr));
    }

    /// Whether the line containing `addr` has an in-flight transaction.
    pub fn is_outstanding(&self, addr: u64) -> bool {
        self.outstanding.contains(&self.layout.line_base(addr))
    }

    /// Line-aligned addresses currently marked outstanding.
    pub fn outstanding(&self) -> impl Iterator<Item = u64> + '_ {
        self.outstanding.iter().copied()
    }
}
