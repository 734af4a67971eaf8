//! # heapscope-core
//!
//! Telemetry ingestion and aggregation for an embedded heap allocator that
//! reports its statistics as text lines over a serial link.
//!
//! ## Quick Start
//!
//! ```no_run
//! use heapscope_core::{Aggregator, RegressionPolicy, ingest, reader};
//!
//! let transport = std::io::BufReader::new(std::fs::File::open("/dev/ttyACM0")?);
//! let (tx, rx) = ingest::queue();
//! let _reader = reader::spawn(transport, tx)?;
//!
//! let mut aggregator = Aggregator::new(128 * 1024, RegressionPolicy::NewSession);
//! for _ in 0..1000 {
//!     let report = aggregator.tick(&rx);
//!     if !report.is_idle() {
//!         let series = aggregator.series();
//!         println!("{} samples, usage {:?}", series.len(), series.heap_usage_pct().last());
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Architecture
//!
//! transport → [`reader`] → [`ingest`] queue → [`Aggregator`] → [`SeriesModel`] → renderer
//!
//! The reader thread blocks on the transport and never decodes. The
//! aggregator runs on the render thread, drains the queue once per tick and
//! decodes with [`record::decode_line`]. The renderer polls
//! [`Aggregator::series`]; nothing is ever pushed to it.

pub mod config;
pub mod error;
pub mod ingest;
pub mod reader;
pub mod record;
pub mod series;
pub mod summary;

pub use config::{
    DEFAULT_RENDER_INTERVAL, DEFAULT_TICK_RATE_HZ, DEFAULT_TOTAL_HEAP_BYTES, MonitorConfig,
    RegressionPolicy,
};
pub use error::{ConfigError, DecodeError, TransportFault};
pub use ingest::{LineReceiver, LineSender, QueueClosed};
pub use reader::{ReaderExit, ReaderHandle};
pub use record::{FIELD_COUNT, Sample, decode_line};
pub use series::{Aggregator, SeriesModel, SessionEvent, TickReport};
pub use summary::SessionSummary;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
