//! A library for turning readiness events on character devices, named pipes
//! and sysfs attribute files into a clean, debounced stream of lines.
//!
//! Each source is read into a small fixed set of line buffers, split on its
//! delimiters, optionally debounced and de-duplicated, and written out through
//! its format, one write per line. A single [`Scheduler`] waits for readiness
//! of all sources at once and wakes early only when a debounced line is due.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use linepoll::{stdout_file, Format, Scheduler, SourceOptions, SourceSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scheduler = Scheduler::new(stdout_file()?);
//!
//!     // A GPIO input: report its value once it has been stable for 50ms.
//!     let gpio = SourceOptions {
//!         format: Format::parse(b"%p %t %l\n"),
//!         debounce: Duration::from_millis(50),
//!         duplicates: false,
//!         ..SourceOptions::default()
//!     };
//!     scheduler.add_source(SourceSpec::new("/sys/class/gpio/gpio4/value", gpio))?;
//!     scheduler.add_source(SourceSpec::new("/tmp/fifo", SourceOptions::default()))?;
//!
//!     scheduler.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! Lines longer than [`MAX_LINE_LEN`] are cut at that length and the rest is
//! read as a new line. Regular files are expected to be pollable attribute
//! files; ordinary files on disk are refused when they are added. Linux only.

mod buffer;
mod config;
mod engine;
mod error;
mod format;
mod output;
mod scheduler;
mod source;

pub use buffer::{BufferPool, LineRef, MAX_LINE_LEN, SEGMENT_COUNT, SEGMENT_LEN};
pub use config::{parse_sources, ConfigError, Delimiters, SourceOptions, SourceSpec};
pub use engine::LineEngine;
pub use error::Error;
pub use format::{unescape, Format, Instruction};
pub use output::{stdout_file, OutputSink, OUTPUT_CAPACITY};
pub use scheduler::{Scheduler, SourceWatch, WatchStatus, MAX_SOURCES};
pub use source::{classify, Access, AccessMode, SourceKind};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
