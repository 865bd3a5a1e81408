//! Backing Memory Model.
//!
//! This module holds the main-memory contents the caches are compared against. It provides:
//! 1. **Ranges:** Address windows with cacheable/shareable attributes and byte contents.
//! 2. **Access routing:** Reads and writes resolved to the single range that maps them.
//! 3. **Generation:** Random initial contents and random line-aligned addresses.
//! 4. **Persistence:** The `main_mem.mem` image preloaded by the external simulation.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use rand::Rng;

use crate::cache::persist::write_file;
use crate::common::error::{ArtifactError, Error, MemoryError, Result};
use crate::config::MemoryRangeConfig;

/// Attributes of an address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RangeAttributes {
    /// Lines may be cached.
    pub cacheable: bool,
    /// Lines may be held by more than one master.
    pub shareable: bool,
}

impl RangeAttributes {
    /// Coherency is only checked where both attributes hold.
    pub const fn coherent(self) -> bool {
        self.cacheable && self.shareable
    }
}

/// A contiguous window of main memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryRange {
    start: u64,
    bytes: Vec<u8>,
    attributes: RangeAttributes,
}

impl MemoryRange {
    /// Creates a zero-filled range.
    pub fn new(start: u64, size: usize, attributes: RangeAttributes) -> Self {
        Self {
            start,
            bytes: vec![0; size],
            attributes,
        }
    }

    /// First byte address.
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// One past the last byte address, saturating at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.bytes.len() as u64)
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-sized range.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Attributes of `addr`; uniform across the range.
    pub const fn attributes(&self, _addr: u64) -> RangeAttributes {
        self.attributes
    }

    /// Whether `[addr, addr + len)` lies inside this range.
    pub fn contains(&self, addr: u64, len: usize) -> bool {
        addr >= self.start
            && addr
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.end())
    }

    fn offset(&self, addr: u64, len: usize) -> Option<usize> {
        self.contains(addr, len).then(|| (addr - self.start) as usize)
    }

    /// Bytes at `[addr, addr + len)`, if mapped by this range.
    pub fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let offset = self.offset(addr, len)?;
        self.bytes.get(offset..offset + len)
    }

    /// Overwrites bytes at `addr`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::Unmapped`] if the write leaves the range.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> std::result::Result<(), MemoryError> {
        let offset = self.offset(addr, data.len()).ok_or(MemoryError::Unmapped {
            addr,
            len: data.len(),
        })?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Fills the range with random bytes.
    pub fn randomize(&mut self, rng: &mut impl Rng) {
        rng.fill(self.bytes.as_mut_slice());
    }

    /// A random `line_bytes`-aligned address whose whole line lies in the range.
    pub fn random_line_addr(&self, rng: &mut impl Rng, line_bytes: usize) -> Option<u64> {
        let first = self.start.next_multiple_of(line_bytes as u64);
        let lines = self.end().saturating_sub(first) / line_bytes as u64;
        (lines > 0).then(|| first + rng.gen_range(0..lines) * line_bytes as u64)
    }
}

impl From<&MemoryRangeConfig> for MemoryRange {
    fn from(cfg: &MemoryRangeConfig) -> Self {
        Self::new(
            cfg.start,
            cfg.size as usize,
            RangeAttributes {
                cacheable: cfg.cacheable,
                shareable: cfg.shareable,
            },
        )
    }
}

/// Main memory: an ordered set of non-overlapping ranges.
#[derive(Clone, Debug, Default)]
pub struct MainMemory {
    ranges: Vec<MemoryRange>,
}

impl MainMemory {
    /// Creates memory with no ranges.
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Registers a range, keeping ranges sorted by start address.
    pub fn add_range(&mut self, range: MemoryRange) {
        self.ranges.push(range);
        self.ranges.sort_by_key(MemoryRange::start);
    }

    /// All registered ranges.
    pub fn ranges(&self) -> &[MemoryRange] {
        &self.ranges
    }

    /// Mutable access to the registered ranges.
    pub fn ranges_mut(&mut self) -> &mut [MemoryRange] {
        &mut self.ranges
    }

    /// Fails with `UndefinedMemoryRanges` until a range is registered.
    ///
    /// # Errors
    ///
    /// [`MemoryError::UndefinedMemoryRanges`] when no range exists.
    pub fn require_ranges(&self) -> std::result::Result<&[MemoryRange], MemoryError> {
        if self.ranges.is_empty() {
            Err(MemoryError::UndefinedMemoryRanges)
        } else {
            Ok(&self.ranges)
        }
    }

    /// Range that maps all of `[addr, addr + len)`.
    pub fn range_for(&self, addr: u64, len: usize) -> Option<&MemoryRange> {
        self.ranges.iter().find(|range| range.contains(addr, len))
    }

    /// Reads `len` bytes at `addr`.
    ///
    /// # Errors
    ///
    /// `UndefinedMemoryRanges` with no ranges, `Unmapped` if no range covers the access.
    pub fn read(&self, addr: u64, len: usize) -> std::result::Result<&[u8], MemoryError> {
        let _ = self.require_ranges()?;
        self.range_for(addr, len)
            .and_then(|range| range.read(addr, len))
            .ok_or(MemoryError::Unmapped { addr, len })
    }

    /// Writes `data` at `addr`.
    ///
    /// # Errors
    ///
    /// `UndefinedMemoryRanges` with no ranges, `Unmapped` if no range covers the access.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> std::result::Result<(), MemoryError> {
        let _ = self.require_ranges()?;
        self.ranges
            .iter_mut()
            .find(|range| range.contains(addr, data.len()))
            .ok_or(MemoryError::Unmapped {
                addr,
                len: data.len(),
            })?
            .write(addr, data)
    }

    /// Fills every range with random bytes.
    ///
    /// # Errors
    ///
    /// [`MemoryError::UndefinedMemoryRanges`] when no range exists.
    pub fn randomize(&mut self, rng: &mut impl Rng) -> std::result::Result<(), MemoryError> {
        let _ = self.require_ranges()?;
        for range in &mut self.ranges {
            range.randomize(rng);
        }
        Ok(())
    }

    /// Writes the memory image, one `line_bytes` chunk per line: `@<hex addr> <hex byte> ...`.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_image(&self, out: &mut impl Write, line_bytes: usize) -> io::Result<()> {
        for range in &self.ranges {
            for (idx, chunk) in range.bytes.chunks(line_bytes.max(1)).enumerate() {
                write!(out, "@{:x}", range.start + (idx * line_bytes) as u64)?;
                for byte in chunk {
                    write!(out, " {byte:x}")?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }

    /// Writes the memory image to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on failure.
    pub fn save(&self, path: &Path, line_bytes: usize) -> Result<()> {
        write_file(path, |out| self.write_image(out, line_bytes))
    }

    /// Loads an image written by [`MainMemory::write_image`] into the registered ranges.
    ///
    /// # Errors
    ///
    /// [`ArtifactError::Malformed`] for unparsable lines, or a memory error if a line is
    /// not mapped.
    pub fn load_image(&mut self, input: impl BufRead) -> Result<()> {
        for (idx, text) in input.lines().enumerate() {
            let line = idx + 1;
            let text = text.map_err(|e| Error::io("memory image", e))?;
            let malformed = |reason: String| ArtifactError::Malformed {
                artifact: "memory",
                line,
                reason,
            };
            let mut tokens = text.split_whitespace();
            let Some(head) = tokens.next() else {
                continue;
            };
            let addr = head
                .strip_prefix('@')
                .and_then(|hex| u64::from_str_radix(hex, 16).ok())
                .ok_or_else(|| malformed(format!("expected `@<hex addr>`, found `{head}`")))?;
            let bytes = tokens
                .map(|tok| u8::from_str_radix(tok, 16))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| malformed(e.to_string()))?;
            self.write(addr, &bytes)?;
        }
        Ok(())
    }

    /// Loads the memory image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened, otherwise as
    /// [`MainMemory::load_image`].
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        self.load_image(BufReader::new(file))
    }
}
