//! Error taxonomy for the ingestion pipeline.
//!
//! - [`DecodeError`] is recoverable and per-line: the aggregator logs it and
//!   moves on to the next record.
//! - [`TransportFault`] ends the stream reader's loop. Lines already queued
//!   are still drained normally.
//! - [`ConfigError`] rejects a configuration before anything is started.
//!
//! A decreasing cumulative counter is not an error at all; it is reported as
//! a [`crate::series::SessionEvent`].

use std::io;
use std::num::ParseIntError;

use thiserror::Error;

/// A wire record that could not be turned into a [`crate::record::Sample`].
///
/// Every variant carries the offending raw line so it can be logged verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The line did not split into exactly the expected number of fields.
    #[error("expected {expected} fields, found {found}: {line:?}")]
    FieldCount {
        line: String,
        expected: usize,
        found: usize,
    },

    /// One field was not a valid non-negative integer of its declared width.
    #[error("field {index} ({field}) is not a valid integer: {source}: {line:?}")]
    InvalidField {
        line: String,
        index: usize,
        field: &'static str,
        #[source]
        source: ParseIntError,
    },
}

impl DecodeError {
    /// The raw line that failed to decode.
    pub fn raw_line(&self) -> &str {
        match self {
            Self::FieldCount { line, .. } | Self::InvalidField { line, .. } => line,
        }
    }
}

/// The transport under the stream reader failed (disconnect, read fault).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport fault ({kind:?}): {message}")]
pub struct TransportFault {
    pub kind: io::ErrorKind,
    pub message: String,
}

impl From<io::Error> for TransportFault {
    fn from(err: io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Invalid monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("total heap size must be greater than zero")]
    ZeroHeapSize,

    #[error("render interval must be greater than zero")]
    ZeroRenderInterval,

    #[error("device tick rate must be greater than zero")]
    ZeroTickRate,

    #[error("unknown counter-regression policy '{0}' (expected new-session or continue)")]
    UnknownRegressionPolicy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_line_is_preserved_for_every_variant() {
        let count = DecodeError::FieldCount {
            line: "1,2,3".into(),
            expected: 14,
            found: 3,
        };
        assert_eq!(count.raw_line(), "1,2,3");

        let source = "x".parse::<u32>().unwrap_err();
        let invalid = DecodeError::InvalidField {
            line: "x,2".into(),
            index: 0,
            field: "ticks",
            source,
        };
        assert_eq!(invalid.raw_line(), "x,2");
    }

    #[test]
    fn decode_error_message_names_the_field() {
        let source = "abc".parse::<u32>().unwrap_err();
        let err = DecodeError::InvalidField {
            line: "abc".into(),
            index: 3,
            field: "max_free_block_bytes",
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("max_free_block_bytes"), "{msg}");
        assert!(msg.contains("field 3"), "{msg}");
    }

    #[test]
    fn transport_fault_from_io_error_keeps_kind() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged");
        let fault = TransportFault::from(io_err);
        assert_eq!(fault.kind, io::ErrorKind::BrokenPipe);
        assert!(fault.message.contains("device unplugged"));
    }
}
