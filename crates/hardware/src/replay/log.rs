//! Diff-log parsing.
//!
//! Simulator diff logs are line-oriented; each line is a list of whitespace-separated
//! `KEY:VALUE` tokens. A token containing `TIME:<integer>` stamps the line. Lines without a
//! parseable stamp are not boundaries and carry no mutation. Unknown tokens are ignored.
//!
//! Cache streams (`cache_diff_{i}.txt`) understand:
//! - `SET:<hex>` and `WAY:<dec>` selecting a slot, with any of `TAG:<hex>`,
//!   `STATE:<3-bit binary>` and `DATA:<hex>,<hex>,...` to write into it;
//! - `OUTSTANDING:<hex addr>` / `RETIRED:<hex addr>` setting or clearing a transaction marker.
//!
//! The memory stream (`main_mem_diff.txt`) understands `ADDR:<hex>` with `DATA:<hex>,...`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::cache::SlotUpdate;
use crate::cache::state::LineState;
use crate::common::error::{Error, Result};

/// Extracts the timestamp of a diff-log line.
///
/// The last `TIME:` token wins; a token whose payload is not an integer is ignored.
pub fn parse_time(line: &str) -> Option<u64> {
    line.split_whitespace().rev().find_map(|token| {
        let idx = token.find("TIME:")?;
        token[idx + "TIME:".len()..].parse().ok()
    })
}

/// One mutation recorded in a cache stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheDiff {
    /// Overwrite fields of one slot.
    Slot {
        /// Set index.
        set: usize,
        /// Way index.
        way: usize,
        /// Fields to write.
        update: SlotUpdate,
    },
    /// A snoop touched this line and its transaction has not finished.
    Outstanding(u64),
    /// The transaction on this line finished.
    Retired(u64),
}

/// One mutation recorded in the memory stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryDiff {
    /// Start address.
    pub addr: u64,
    /// Bytes written.
    pub data: Vec<u8>,
}

/// A stream parser: maps a stamped line to its mutations, or a reason for rejecting it.
pub trait DiffRecord: Sized {
    /// Parses the mutation tokens of one stamped line.
    ///
    /// # Errors
    ///
    /// A human-readable reason when a known field is malformed.
    fn parse(line: &str) -> std::result::Result<Vec<Self>, String>;
}

/// Splits `KEY:VALUE` tokens, skipping tokens without a colon.
fn fields(line: &str) -> impl Iterator<Item = (&str, &str)> {
    line.split_whitespace().filter_map(|token| token.split_once(':'))
}

fn hex_u64(key: &str, value: &str) -> std::result::Result<u64, String> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| format!("{key}:{value}: {e}"))
}

fn hex_bytes(value: &str) -> std::result::Result<Vec<u8>, String> {
    value
        .split(',')
        .filter(|byte| !byte.is_empty())
        .map(|byte| u8::from_str_radix(byte, 16).map_err(|e| format!("DATA byte `{byte}`: {e}")))
        .collect()
}

impl DiffRecord for CacheDiff {
    fn parse(line: &str) -> std::result::Result<Vec<Self>, String> {
        let mut set = None;
        let mut way = None;
        let mut update = SlotUpdate::default();
        let mut diffs = Vec::new();

        for (key, value) in fields(line) {
            match key {
                "SET" => set = Some(hex_u64(key, value)? as usize),
                "WAY" => {
                    way = Some(
                        value
                            .parse::<usize>()
                            .map_err(|e| format!("WAY:{value}: {e}"))?,
                    );
                }
                "TAG" => update.tag = Some(hex_u64(key, value)?),
                "STATE" => {
                    let state = u8::from_str_radix(value, 2)
                        .ok()
                        .and_then(LineState::from_packed)
                        .ok_or_else(|| format!("STATE:{value} is not a MOESI bit triple"))?;
                    update.state = Some(state);
                }
                "DATA" => update.data = Some(hex_bytes(value)?),
                "OUTSTANDING" => diffs.push(Self::Outstanding(hex_u64(key, value)?)),
                "RETIRED" => diffs.push(Self::Retired(hex_u64(key, value)?)),
                _ => {}
            }
        }

        let touches_slot = update != SlotUpdate::default();
        match (set, way) {
            (Some(set), Some(way)) if touches_slot => diffs.insert(0, Self::Slot { set, way, update }),
            (None, _) | (_, None) if touches_slot => {
                return Err("slot fields without both SET and WAY".to_owned());
            }
            _ => {}
        }
        Ok(diffs)
    }
}

impl DiffRecord for MemoryDiff {
    fn parse(line: &str) -> std::result::Result<Vec<Self>, String> {
        let mut addr = None;
        let mut data = None;
        for (key, value) in fields(line) {
            match key {
                "ADDR" => addr = Some(hex_u64(key, value)?),
                "DATA" => data = Some(hex_bytes(value)?),
                _ => {}
            }
        }
        match (addr, data) {
            (Some(addr), Some(data)) => Ok(vec![Self { addr, data }]),
            (None, None) => Ok(Vec::new()),
            _ => Err("memory write needs both ADDR and DATA".to_owned()),
        }
    }
}

/// All stamped mutations of one stream, ordered by time.
///
/// Records with equal stamps keep their file order.
#[derive(Clone, Debug)]
pub struct DiffStream<T> {
    records: Vec<(u64, T)>,
}

impl<T> Default for DiffStream<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T: DiffRecord> DiffStream<T> {
    /// Builds a stream from already-stamped records.
    pub fn from_records(mut records: Vec<(u64, T)>) -> Self {
        records.sort_by_key(|(time, _)| *time);
        Self { records }
    }

    /// Parses a stream, dropping unstamped and malformed lines.
    ///
    /// # Errors
    ///
    /// Propagates read failures from `input`.
    pub fn parse(name: &str, input: impl BufRead) -> io::Result<Self> {
        let mut records = Vec::new();
        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            let Some(time) = parse_time(&line) else {
                continue;
            };
            match T::parse(&line) {
                Ok(diffs) => records.extend(diffs.into_iter().map(|diff| (time, diff))),
                Err(reason) => warn!(stream = name, line = idx + 1, %reason, "dropping diff-log line"),
            }
        }
        Ok(Self::from_records(records))
    }

    /// Loads the stream at `path`; a missing file is an empty stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for any failure other than the file not existing.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::io(path, e)),
        };
        Self::parse(&path.display().to_string(), BufReader::new(file)).map_err(|e| Error::io(path, e))
    }
}

impl<T> DiffStream<T> {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the stream holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the first record stamped after `clock` (`None` is before every stamp).
    fn first_after(&self, clock: Option<u64>) -> usize {
        clock.map_or(0, |clock| {
            self.records.partition_point(|(time, _)| *time <= clock)
        })
    }

    /// Smallest stamp strictly greater than `clock`.
    pub fn next_after(&self, clock: Option<u64>) -> Option<u64> {
        self.records
            .get(self.first_after(clock))
            .map(|(time, _)| *time)
    }

    /// Records stamped in `(clock, until]`, in stream order.
    pub fn window(&self, clock: Option<u64>, until: u64) -> impl Iterator<Item = &(u64, T)> + '_ {
        self.records[self.first_after(clock)..]
            .iter()
            .take_while(move |(time, _)| *time <= until)
    }
}
