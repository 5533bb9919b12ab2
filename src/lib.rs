//! # recordfile
//!
//! Record-oriented file I/O. Sequences of discrete records are written to and
//! read from files or arbitrary streams, with gzip layered in transparently,
//! and large record files can be split into bounded parts and joined back
//! byte for byte.
//!
//! ## Formats
//!
//! - **JSON Lines** (feature: `io-jsonl`) - one compact JSON object per line,
//!   see [`io::jsonl`]
//! - **Length-prefixed messages** (feature: `io-message`) - `[u32 BE length][payload]`
//!   frames with a postcard marshaler by default, see [`io::message`]
//! - **CSV rows** (feature: `io-csv`) - RFC 4180 rows with per-field value
//!   transforms and header-based field lookup, see [`io::csv`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use recordfile::FileService;
//! use std::collections::BTreeMap;
//! # fn main() -> recordfile::Result<()> {
//!
//! let fs = FileService::default();
//!
//! // `.gz` suffix turns on gzip
//! let mut w = fs.new_json_file("events.jsonl.gz")?;
//! w.write(&BTreeMap::from([("kind", "click")]))?;
//! w.close()?;
//!
//! let mut r = fs.open_json_file("events.jsonl.gz")?;
//! while let Some(event) = r.read::<BTreeMap<String, String>>()? {
//!     println!("{event:?}");
//! }
//!
//! // 1000 records per part: events.1.jsonl.gz, events.2.jsonl.gz, ...
//! let parts = fs.split_json_file("events.jsonl.gz", 1000, |i| format!("events.{i}.jsonl.gz").into())?;
//! fs.join_json_files("events.joined.jsonl.gz", &parts)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## End-of-stream
//!
//! Readers return `Ok(None)` when the sequence is exhausted and keep returning
//! it on every later call. Any `Err` is a real failure; see [`Error`].
//!
//! ## Module Overview
//!
//! - [`service`] - [`FileService`]: open/create readers and writers, split, join
//! - [`io::compression`] - stream stacks with optional gzip
//! - [`io::split`] - format-generic split/join algorithms
//! - [`config`] - [`FileServiceConfig`] (buffer size, gzip level)
//! - [`error`] - [`Error`] and [`Result`]

pub mod config;
pub mod error;
pub mod io;
pub mod service;

pub use config::{FileServiceConfig, DEFAULT_BUFFER_SIZE};
pub use error::{Error, Result};
pub use io::compression::Compression;
pub use io::split::{RecordFormat, RecordRead, RecordWrite};
pub use service::FileService;

#[cfg(feature = "io-jsonl")]
pub use io::jsonl::{JsonMarshaler, JsonReader, JsonWriter, ObjectMarshaler};

#[cfg(feature = "io-message")]
pub use io::message::{MessageMarshaler, MessageReader, MessageWriter, PostcardMarshaler};

#[cfg(feature = "io-csv")]
pub use io::csv::{
    pandas_friendly, remove_hash, trim, RowCursor, RowReader, RowRecord, RowSchema, RowWriter,
    ValueTransform, EMPTY_VALUES,
};
