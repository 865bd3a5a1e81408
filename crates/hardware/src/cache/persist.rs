//! Persisted cache state artifacts.
//!
//! A cache is written as three parallel text files, one line per valid way, each prefixed
//! with `@<hex set index>`:
//! 1. **Data:** `@<set> <hex byte> <hex byte> ...`
//! 2. **Tag:** `@<set> <hex tag>`
//! 3. **State:** `@<set> <3-bit binary DIRTY SHARED VALID>`
//!
//! Invalid ways are omitted from all three. These are the memory-initialisation files the
//! external RTL simulation preloads into its cache RAMs.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::CacheArray;
use super::state::LineState;
use crate::common::error::{ArtifactError, Error, Result};

impl CacheArray {
    /// Writes the data artifact.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_data(&self, out: &mut impl Write) -> io::Result<()> {
        for (set, _, line) in self.valid_lines() {
            write!(out, "@{set:x}")?;
            for byte in &line.data {
                write!(out, " {byte:x}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes the tag artifact.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_tags(&self, out: &mut impl Write) -> io::Result<()> {
        for (set, _, line) in self.valid_lines() {
            writeln!(out, "@{set:x} {:x}", line.tag)?;
        }
        Ok(())
    }

    /// Writes the state artifact.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn write_states(&self, out: &mut impl Write) -> io::Result<()> {
        for (set, _, line) in self.valid_lines() {
            writeln!(out, "@{set:x} {:03b}", line.state.packed())?;
        }
        Ok(())
    }

    /// Writes all three artifacts to the given paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] naming the file that failed.
    pub fn save_state(&self, data_file: &Path, tag_file: &Path, state_file: &Path) -> Result<()> {
        write_file(data_file, |out| self.write_data(out))?;
        write_file(tag_file, |out| self.write_tags(out))?;
        write_file(state_file, |out| self.write_states(out))
    }

    /// Re-allocates every persisted record into this cache.
    ///
    /// Records are placed in the first free way of their set, so restoring into an empty
    /// cache reproduces the saved way order.
    ///
    /// # Errors
    ///
    /// [`ArtifactError`] for malformed or misaligned records, including a set index outside
    /// the geometry or a tag wider than `tag_bits`, or a cache error if a record does not fit.
    pub fn restore(&mut self, data: impl BufRead, tags: impl BufRead, states: impl BufRead) -> Result<()> {
        let data = read_records("data", data)?;
        let tags = read_records("tag", tags)?;
        let states = read_records("state", states)?;
        if data.len() != tags.len() || data.len() != states.len() {
            return Err(ArtifactError::Misaligned {
                record: data.len().min(tags.len()).min(states.len()),
            }
            .into());
        }

        for (record, ((data, tag), state)) in data.iter().zip(&tags).zip(&states).enumerate() {
            if data.set != tag.set || data.set != state.set {
                return Err(ArtifactError::Misaligned { record }.into());
            }
            if data.set >= self.sets() {
                return Err(data
                    .malformed("data", format!("set {:#x} is outside {} sets", data.set, self.sets()))
                    .into());
            }
            let bytes = data
                .fields
                .iter()
                .map(|field| u8::from_str_radix(field, 16))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| data.malformed("data", e))?;
            let tag_value = match tag.fields.as_slice() {
                [value] => u64::from_str_radix(value, 16).map_err(|e| tag.malformed("tag", e))?,
                _ => return Err(tag.malformed("tag", "expected one tag field").into()),
            };
            let tag_bits = self.layout().tag_bits();
            if tag_value.checked_shr(tag_bits).unwrap_or(0) != 0 {
                return Err(tag
                    .malformed("tag", format!("tag {tag_value:#x} is wider than {tag_bits} bits"))
                    .into());
            }
            let line_state = match state.fields.as_slice() {
                [value] => u8::from_str_radix(value, 2)
                    .ok()
                    .and_then(LineState::from_packed)
                    .ok_or_else(|| state.malformed("state", "not a MOESI bit triple"))?,
                _ => return Err(state.malformed("state", "expected one state field").into()),
            };
            let addr = self.layout().compose(tag_value, data.set);
            let _ = self.allocate(addr, &bytes, line_state)?;
        }
        Ok(())
    }

    /// Reads all three artifacts from the given paths; see [`CacheArray::restore`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a file cannot be opened, otherwise as [`CacheArray::restore`].
    pub fn load_state(&mut self, data_file: &Path, tag_file: &Path, state_file: &Path) -> Result<()> {
        let open = |path: &Path| {
            File::open(path)
                .map(BufReader::new)
                .map_err(|e| Error::io(path, e))
        };
        self.restore(open(data_file)?, open(tag_file)?, open(state_file)?)
    }
}

/// One `@<set> fields...` line.
#[derive(Debug)]
struct Record {
    line: usize,
    set: usize,
    fields: Vec<String>,
}

impl Record {
    fn malformed(&self, artifact: &'static str, reason: impl ToString) -> ArtifactError {
        ArtifactError::Malformed {
            artifact,
            line: self.line,
            reason: reason.to_string(),
        }
    }
}

fn read_records(artifact: &'static str, input: impl BufRead) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (idx, text) in input.lines().enumerate() {
        let line = idx + 1;
        let text = text.map_err(|e| Error::io(artifact, e))?;
        let mut tokens = text.split_whitespace();
        let Some(head) = tokens.next() else {
            continue;
        };
        let set = head
            .strip_prefix('@')
            .and_then(|hex| usize::from_str_radix(hex, 16).ok())
            .ok_or_else(|| ArtifactError::Malformed {
                artifact,
                line,
                reason: format!("expected `@<hex set>`, found `{head}`"),
            })?;
        records.push(Record {
            line,
            set,
            fields: tokens.map(str::to_owned).collect(),
        });
    }
    Ok(records)
}

/// Creates `path` and hands a buffered writer to `body`.
pub(crate) fn write_file(path: &Path, body: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);
    body(&mut out)
        .and_then(|()| out.flush())
        .map_err(|e| Error::io(path, e))
}
