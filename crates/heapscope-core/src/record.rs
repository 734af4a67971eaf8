//! Wire record decoding.
//!
//! The device emits one line per sample: fourteen comma-separated decimal
//! integers in a fixed order, no header row.
//!
//! ```text
//! ticks,free_space_bytes,min_free_block_bytes,max_free_block_bytes,
//! alloc_count_window,alloc_time_us_window,free_count_window,free_time_us_window,
//! active_task_count,internal_fragmentation_bytes,
//! successful_alloc_total,successful_free_total,
//! minimum_ever_free_bytes,free_block_count
//! ```
//!
//! Decoding is all-or-nothing: a line either yields a complete [`Sample`] or a
//! [`DecodeError`] that carries the raw line.
//!
//! The firmware prints its unsigned 32-bit counters with `%d`, so a counter
//! past `i32::MAX` arrives as a negative number. Negative fields in the `i32`
//! range are read back as the `u32` the device holds.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DecodeError;

/// Field delimiter on the wire.
pub const DELIMITER: char = ',';

/// Wire field names, in wire order.
pub const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "ticks",
    "free_space_bytes",
    "min_free_block_bytes",
    "max_free_block_bytes",
    "alloc_count_window",
    "alloc_time_us_window",
    "free_count_window",
    "free_time_us_window",
    "active_task_count",
    "internal_fragmentation_bytes",
    "successful_alloc_total",
    "successful_free_total",
    "minimum_ever_free_bytes",
    "free_block_count",
];

/// Number of fields in one wire record.
pub const FIELD_COUNT: usize = 14;

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// One decoded heap-statistics record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Sample {
    /// Device clock ticks at emission time.
    pub ticks: u64,
    pub free_space_bytes: u32,
    pub min_free_block_bytes: u32,
    pub max_free_block_bytes: u32,
    /// Latency accumulators over a device-side window.
    pub alloc_count_window: u32,
    pub alloc_time_us_window: u32,
    pub free_count_window: u32,
    pub free_time_us_window: u32,
    pub active_task_count: u32,
    /// Cumulative bytes lost to allocator overhead and alignment.
    pub internal_fragmentation_bytes: u32,
    /// Non-decreasing within one device session.
    pub successful_alloc_total: u64,
    /// Non-decreasing within one device session.
    pub successful_free_total: u64,
    /// Historical low-water mark, non-increasing within one device session.
    pub minimum_ever_free_bytes: u32,
    pub free_block_count: u32,
}

impl Sample {
    /// Total successful heap operations (allocations plus frees).
    pub fn operation_count(&self) -> u64 {
        self.successful_alloc_total.saturating_add(self.successful_free_total)
    }

    /// Percentage of the heap in use.
    ///
    /// Not clamped: a free-space report larger than the configured heap yields
    /// a negative value, which points at a mismatched heap-size setting.
    pub fn heap_usage_pct(&self, total_heap_bytes: u64) -> f64 {
        if total_heap_bytes == 0 {
            return 0.0;
        }
        let total = total_heap_bytes as f64;
        (total - f64::from(self.free_space_bytes)) * 100.0 / total
    }

    /// Device uptime in seconds for a device running at `tick_rate_hz`.
    pub fn uptime_secs(&self, tick_rate_hz: u32) -> f64 {
        if tick_rate_hz == 0 {
            return 0.0;
        }
        self.ticks as f64 / f64::from(tick_rate_hz)
    }

    /// True if either cumulative counter went backwards relative to `previous`.
    pub fn regressed_from(&self, previous: &Sample) -> bool {
        self.successful_alloc_total < previous.successful_alloc_total
            || self.successful_free_total < previous.successful_free_total
    }
}

/// Formats the sample back into its wire line (without the trailing newline).
impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.ticks,
            self.free_space_bytes,
            self.min_free_block_bytes,
            self.max_free_block_bytes,
            self.alloc_count_window,
            self.alloc_time_us_window,
            self.free_count_window,
            self.free_time_us_window,
            self.active_task_count,
            self.internal_fragmentation_bytes,
            self.successful_alloc_total,
            self.successful_free_total,
            self.minimum_ever_free_bytes,
            self.free_block_count,
        )
    }
}

impl FromStr for Sample {
    type Err = DecodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        decode_line(line)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one wire line into a [`Sample`].
///
/// Whitespace around the line and around each field is ignored. A wrong
/// field count, a non-digit or a value outside the device's 32-bit range
/// fails the whole line.
pub fn decode_line(line: &str) -> Result<Sample, DecodeError> {
    let trimmed = line.trim();
    let fields: Vec<&str> = trimmed.split(DELIMITER).map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            line: line.to_string(),
            expected: FIELD_COUNT,
            found: fields.len(),
        });
    }

    let mut cursor = Fields {
        line,
        fields: &fields,
        index: 0,
    };

    Ok(Sample {
        ticks: cursor.next()?,
        free_space_bytes: cursor.next()?,
        min_free_block_bytes: cursor.next()?,
        max_free_block_bytes: cursor.next()?,
        alloc_count_window: cursor.next()?,
        alloc_time_us_window: cursor.next()?,
        free_count_window: cursor.next()?,
        free_time_us_window: cursor.next()?,
        active_task_count: cursor.next()?,
        internal_fragmentation_bytes: cursor.next()?,
        successful_alloc_total: cursor.next()?,
        successful_free_total: cursor.next()?,
        minimum_ever_free_bytes: cursor.next()?,
        free_block_count: cursor.next()?,
    })
}

/// Walks the split fields in wire order, attaching field context to failures.
struct Fields<'a> {
    line: &'a str,
    fields: &'a [&'a str],
    index: usize,
}

impl Fields<'_> {
    fn next<T: WireInt>(&mut self) -> Result<T, DecodeError> {
        let index = self.index;
        self.index += 1;
        T::from_wire(self.fields[index]).map_err(|source| DecodeError::InvalidField {
                line: self.line.to_string(),
                index,
                field: FIELD_NAMES[index],
                source,
            })
    }
}

/// Integer field as printed by the device.
trait WireInt: Sized {
    fn from_wire(field: &str) -> Result<Self, ParseIntError>;
}

/// `%d` rendering of a `u32` above `i32::MAX`.
fn wrapped_u32(field: &str) -> Result<u32, ParseIntError> {
    field.parse::<i32>().map(|v| v as u32)
}

impl WireInt for u32 {
    fn from_wire(field: &str) -> Result<Self, ParseIntError> {
        if field.starts_with('-') {
            wrapped_u32(field)
        } else {
            field.parse()
        }
    }
}

impl WireInt for u64 {
    fn from_wire(field: &str) -> Result<Self, ParseIntError> {
        if field.starts_with('-') {
            wrapped_u32(field).map(u64::from)
        } else {
            field.parse()
        }
    }
}
