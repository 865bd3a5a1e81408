//! Address decomposition for set-associative caches.
//!
//! An address of `addr_width` bits is split as `[tag | index | block-offset]`:
//! 1. **Block offset:** `log2(cacheline_bytes)` low bits select a byte within a line.
//! 2. **Index:** `log2(sets)` bits select the set.
//! 3. **Tag:** the remaining `addr_width - index_bits - block_offset_bits` high bits.

use crate::common::error::ConfigError;

/// Bit-field layout of a cache address.
///
/// Both `sets` and the line size must be powers of two, so every field is a
/// contiguous run of bits and `tag_bits + index_bits + block_offset_bits == addr_width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressLayout {
    addr_width: u32,
    index_bits: u32,
    block_offset_bits: u32,
}

impl AddressLayout {
    /// Builds a layout for the given address width and cache geometry.
    ///
    /// # Arguments
    ///
    /// * `addr_width` - Total address width in bits (at most 64).
    /// * `sets` - Number of sets; must be a power of two.
    /// * `cacheline_bytes` - Line size in bytes; must be a power of two.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a geometry parameter is not a power of two
    /// or the address is too narrow (or too wide) for the fields.
    pub fn new(addr_width: u32, sets: usize, cacheline_bytes: usize) -> Result<Self, ConfigError> {
        if !sets.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "sets",
                value: sets,
            });
        }
        if !cacheline_bytes.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "cacheline_bytes",
                value: cacheline_bytes,
            });
        }
        if addr_width > u64::BITS {
            return Err(ConfigError::AddressTooWide(addr_width));
        }
        let index_bits = sets.trailing_zeros();
        let block_offset_bits = cacheline_bytes.trailing_zeros();
        let required = index_bits + block_offset_bits;
        if addr_width < required {
            return Err(ConfigError::AddressTooNarrow {
                addr_width,
                required,
            });
        }
        Ok(Self {
            addr_width,
            index_bits,
            block_offset_bits,
        })
    }

    /// Total address width in bits.
    #[inline]
    pub const fn addr_width(&self) -> u32 {
        self.addr_width
    }

    /// Number of set-index bits.
    #[inline]
    pub const fn index_bits(&self) -> u32 {
        self.index_bits
    }

    /// Number of block-offset bits.
    #[inline]
    pub const fn block_offset_bits(&self) -> u32 {
        self.block_offset_bits
    }

    /// Number of tag bits.
    #[inline]
    pub const fn tag_bits(&self) -> u32 {
        self.addr_width - self.index_bits - self.block_offset_bits
    }

    /// Cache line size in bytes.
    #[inline]
    pub const fn cacheline_bytes(&self) -> usize {
        1 << self.block_offset_bits
    }

    /// Number of sets.
    #[inline]
    pub const fn sets(&self) -> usize {
        1 << self.index_bits
    }

    /// Mask selecting the index field in place.
    #[inline]
    pub const fn index_mask(&self) -> u64 {
        low_mask(self.index_bits) << self.block_offset_bits
    }

    /// Set index of `addr`: `(addr & index_mask) >> block_offset_bits`.
    #[inline]
    pub const fn index(&self, addr: u64) -> usize {
        ((addr & self.index_mask()) >> self.block_offset_bits) as usize
    }

    /// Tag of `addr`: its upper `tag_bits`.
    #[inline]
    pub const fn tag(&self, addr: u64) -> u64 {
        let shift = self.index_bits + self.block_offset_bits;
        if shift >= u64::BITS {
            return 0;
        }
        (addr >> shift) & low_mask(self.tag_bits())
    }

    /// Clears the block-offset bits of `addr`.
    #[inline]
    pub const fn line_base(&self, addr: u64) -> u64 {
        addr & !low_mask(self.block_offset_bits)
    }

    /// Rebuilds the line-aligned address held in `(tag, set)`.
    pub const fn compose(&self, tag: u64, set: usize) -> u64 {
        let shift = self.index_bits + self.block_offset_bits;
        let high = if shift >= u64::BITS { 0 } else { tag << shift };
        high | ((set as u64) << self.block_offset_bits)
    }
}

/// Mask with the low `bits` bits set.
const fn low_mask(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
