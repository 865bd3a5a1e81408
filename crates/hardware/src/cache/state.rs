//! MOESI line states.
//!
//! Each state is stored in hardware as three independent bits, VALID, SHARED and DIRTY:
//!
//! | State     | VALID | SHARED | DIRTY |
//! |-----------|-------|--------|-------|
//! | Modified  | 1     | 0      | 1     |
//! | Owned     | 1     | 1      | 1     |
//! | Exclusive | 1     | 0      | 0     |
//! | Shared    | 1     | 1      | 0     |
//! | Invalid   | 0     | 0      | 0     |
//!
//! Any other triple is not a state and is rejected by decoding.

use std::fmt;

/// Bit position of VALID in the packed 3-bit encoding.
pub const VALID_BIT: u8 = 0;
/// Bit position of SHARED in the packed 3-bit encoding.
pub const SHARED_BIT: u8 = 1;
/// Bit position of DIRTY in the packed 3-bit encoding.
pub const DIRTY_BIT: u8 = 2;

/// The raw VALID/SHARED/DIRTY triple of a cache line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StateBits {
    /// Line holds data.
    pub valid: bool,
    /// Other caches may hold copies.
    pub shared: bool,
    /// Line differs from memory and must be written back.
    pub dirty: bool,
}

impl StateBits {
    /// Packs the triple as `DIRTY:SHARED:VALID` (VALID in bit 0).
    pub const fn pack(self) -> u8 {
        (self.valid as u8) << VALID_BIT
            | (self.shared as u8) << SHARED_BIT
            | (self.dirty as u8) << DIRTY_BIT
    }

    /// Unpacks the low three bits of `raw`; higher bits must be clear.
    pub const fn unpack(raw: u8) -> Option<Self> {
        if raw > 0b111 {
            return None;
        }
        Some(Self {
            valid: raw & (1 << VALID_BIT) != 0,
            shared: raw & (1 << SHARED_BIT) != 0,
            dirty: raw & (1 << DIRTY_BIT) != 0,
        })
    }
}

/// MOESI state of one cache line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LineState {
    /// Dirty, only valid copy.
    Modified,
    /// Dirty, authoritative copy; other caches may hold clean `Shared` copies.
    Owned,
    /// Clean, only valid copy.
    Exclusive,
    /// Clean, read-only copy.
    Shared,
    /// No data.
    #[default]
    Invalid,
}

impl LineState {
    /// All five states, in MOESI order.
    pub const ALL: [Self; 5] = [
        Self::Modified,
        Self::Owned,
        Self::Exclusive,
        Self::Shared,
        Self::Invalid,
    ];

    /// Encodes the state as its bit triple.
    pub const fn bits(self) -> StateBits {
        let (valid, shared, dirty) = match self {
            Self::Modified => (true, false, true),
            Self::Owned => (true, true, true),
            Self::Exclusive => (true, false, false),
            Self::Shared => (true, true, false),
            Self::Invalid => (false, false, false),
        };
        StateBits {
            valid,
            shared,
            dirty,
        }
    }

    /// Decodes a bit triple; `None` for the three triples that name no state
    /// (SHARED or DIRTY set without VALID).
    pub const fn from_bits(bits: StateBits) -> Option<Self> {
        match (bits.valid, bits.shared, bits.dirty) {
            (true, false, true) => Some(Self::Modified),
            (true, true, true) => Some(Self::Owned),
            (true, false, false) => Some(Self::Exclusive),
            (true, true, false) => Some(Self::Shared),
            (false, false, false) => Some(Self::Invalid),
            (false, _, _) => None,
        }
    }

    /// Packed 3-bit encoding (`DIRTY:SHARED:VALID`).
    pub const fn packed(self) -> u8 {
        self.bits().pack()
    }

    /// Decodes a packed 3-bit value.
    pub const fn from_packed(raw: u8) -> Option<Self> {
        match StateBits::unpack(raw) {
            Some(bits) => Self::from_bits(bits),
            None => None,
        }
    }

    /// True for every state except `Invalid`.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// True for the two dirty-owning states, `Modified` and `Owned`.
    #[inline]
    pub const fn is_owner(self) -> bool {
        matches!(self, Self::Modified | Self::Owned)
    }

    /// Whether `self` in one cache may coexist with `other` in a different cache
    /// for the same address.
    ///
    /// `Invalid` coexists with everything. `Modified` and `Exclusive` tolerate no other
    /// valid copy. `Owned` tolerates `Shared` copies but no second owner, and `Shared`
    /// tolerates `Shared` and `Owned`. The relation is symmetric.
    pub const fn compatible(self, other: Self) -> bool {
        use LineState::{Exclusive, Invalid, Modified, Owned, Shared};
        match (self, other) {
            (Invalid, _) | (_, Invalid) => true,
            (Modified | Exclusive, _) | (_, Modified | Exclusive) => false,
            (Owned, Owned) => false,
            (Owned | Shared, Shared) | (Shared, Owned) => true,
        }
    }

    /// Single-letter MOESI mnemonic.
    pub const fn letter(self) -> char {
        match self {
            Self::Modified => 'M',
            Self::Owned => 'O',
            Self::Exclusive => 'E',
            Self::Shared => 'S',
            Self::Invalid => 'I',
        }
    }
}

/// Free-function form of [`LineState::compatible`].
#[inline]
pub const fn compatible(a: LineState, b: LineState) -> bool {
    a.compatible(b)
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Modified => "MODIFIED",
            Self::Owned => "OWNED",
            Self::Exclusive => "EXCLUSIVE",
            Self::Shared => "SHARED",
            Self::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}
