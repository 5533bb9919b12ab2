//! CSV row codec with value transforms and name-based field lookup.
//!
//! This module provides:
//! - [`RowWriter`] / [`RowReader`]: comma-delimited rows over a (possibly
//!   gzip-compressed) stream, RFC 4180 quoting via the `csv` crate
//! - [`ValueTransform`]s applied, in registration order, to every field on
//!   both write and read ([`trim`], [`pandas_friendly`], [`remove_hash`])
//! - [`RowSchema`] / [`RowRecord`]: column-name lookup, either from a header
//!   row ([`RowReader::read_header`]) or from a known column list
//!
//! # Design notes
//! - No header is ever written implicitly; write it as the first row.
//! - Rows may be ragged. [`RowRecord::field`] falls back to the caller's
//!   default when a row is shorter than the header.
//! - Records are terminated by `\n`; fields are quoted only when needed.

use crate::config::FileServiceConfig;
use crate::error::{Error, Result};
use crate::io::compression::{read_error, Compression, SinkStack, SourceStack};
use crate::io::split::{RecordRead, RecordWrite};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Pure per-field transform, e.g. for normalizing empty markers.
pub type ValueTransform = fn(&str) -> String;

/// Values that [`pandas_friendly`] collapses into the `#` sentinel.
pub const EMPTY_VALUES: [&str; 14] = [
    "n/a", "N/A", "N/a", "null", "NULL", "Null", "nil", "NIL", "Nil", "nan", "NaN", "Nan", "#", "",
];

/// Strip leading and trailing whitespace.
pub fn trim(value: &str) -> String {
    value.trim().to_string()
}

/// Map blank and null-like values to `#`, which pandas will not coerce.
pub fn pandas_friendly(value: &str) -> String {
    if EMPTY_VALUES.contains(&value) {
        "#".to_string()
    } else {
        value.to_string()
    }
}

/// Inverse of [`pandas_friendly`]: the `#` sentinel becomes an empty string.
pub fn remove_hash(value: &str) -> String {
    if value == "#" {
        String::new()
    } else {
        value.to_string()
    }
}

fn apply_transforms<'a>(
    transforms: &[ValueTransform],
    fields: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    fields
        .into_iter()
        .map(|field| {
            let mut value = field.to_string();
            for transform in transforms {
                value = transform(&value);
            }
            value
        })
        .collect()
}

fn csv_error(context: String, err: csv::Error) -> Error {
    if !err.is_io_error() {
        return Error::decode(context, err);
    }
    match err.into_kind() {
        csv::ErrorKind::Io(e) => read_error(context, e),
        other => Error::decode(context, format!("{other:?}")),
    }
}

/// Byte sink under the `csv::Writer`: keeps the first stream failure instead
/// of raising it inside the CSV encoder, so the stream stack can always be
/// taken back out and finished.
struct RowSink<W: Write> {
    sink: SinkStack<W>,
    failed: Option<io::Error>,
}

impl<W: Write> RowSink<W> {
    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            self.failed.get_or_insert(e);
        }
    }
}

impl<W: Write> Write for RowSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed.is_none() {
            let result = self.sink.write_all(buf);
            self.record(result);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed.is_none() {
            let result = self.sink.flush();
            self.record(result);
        }
        Ok(())
    }
}

/// Writes CSV rows over a (possibly gzip-compressed) stream.
pub struct RowWriter<W: Write> {
    writer: csv::Writer<RowSink<W>>,
    transforms: Vec<ValueTransform>,
    label: String,
}

impl<W: Write> RowWriter<W> {
    pub fn new(
        inner: W,
        compression: Compression,
        config: &FileServiceConfig,
        transforms: &[ValueTransform],
    ) -> Self {
        let sink = RowSink {
            sink: SinkStack::new(inner, compression, config),
            failed: None,
        };
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .buffer_capacity(config.effective_buffer_size())
            .from_writer(sink);
        Self {
            writer,
            transforms: transforms.to_vec(),
            label: "stream".to_string(),
        }
    }

    pub(crate) fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Transform every field and write them as one row.
    ///
    /// Once the underlying stream has failed, every later write reports it.
    pub fn write<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<S> = fields.into_iter().collect();
        let row = apply_transforms(&self.transforms, fields.iter().map(|f| f.as_ref()));
        self.writer
            .write_record(&row)
            .map_err(|e| csv_error(format!("write row to '{}'", self.label), e))?;
        match &self.writer.get_ref().failed {
            Some(e) => Err(Error::io(
                format!("write row to '{}'", self.label),
                io::Error::new(e.kind(), e.to_string()),
            )),
            None => Ok(()),
        }
    }

    /// Flush the CSV buffer, then finalize every layer of the stream stack.
    /// The first failure seen on the way down is reported.
    pub fn finish(self) -> Result<W> {
        let label = self.label;
        let RowSink { sink, failed } = self.writer.into_inner().map_err(|e| {
            let cause = e.error();
            Error::io(
                format!("flush rows to '{label}'"),
                io::Error::new(cause.kind(), cause.to_string()),
            )
        })?;
        let finished = sink.finish();
        match failed {
            Some(e) => Err(Error::io(format!("flush rows to '{label}'"), e)),
            None => finished,
        }
    }

    pub fn close(self) -> Result<()> {
        self.finish().map(drop)
    }
}

/// Reads CSV rows from a (possibly gzip-compressed) stream.
pub struct RowReader<R: Read> {
    reader: csv::Reader<SourceStack<R>>,
    transforms: Vec<ValueTransform>,
    record: csv::StringRecord,
    label: String,
    rows_read: u64,
    done: bool,
}

impl<R: Read> RowReader<R> {
    pub fn new(
        inner: R,
        compression: Compression,
        config: &FileServiceConfig,
        label: impl Into<String>,
        transforms: &[ValueTransform],
    ) -> Result<Self> {
        let label = label.into();
        let source = SourceStack::new(inner, compression, config, &label)?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(config.effective_buffer_size())
            .from_reader(source);
        Ok(Self {
            reader,
            transforms: transforms.to_vec(),
            record: csv::StringRecord::new(),
            label,
            rows_read: 0,
            done: false,
        })
    }

    /// Next row with transforms applied, or `None` at end-of-stream.
    pub fn read(&mut self) -> Result<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| csv_error(format!("read row in '{}'", self.label), e))?;
        if !more {
            self.done = true;
            return Ok(None);
        }
        self.rows_read += 1;
        Ok(Some(apply_transforms(&self.transforms, self.record.iter())))
    }

    /// Consume the first row as a header and return a cursor whose records
    /// resolve fields by column name.
    ///
    /// Must be the first read on this reader. Returns `None` if the stream
    /// holds no rows at all.
    pub fn read_header(&mut self) -> Result<Option<RowCursor<'_, R>>> {
        if self.rows_read > 0 {
            return Err(Error::InvalidState(
                "read_header must be the first read on a row reader",
            ));
        }
        let Some(header) = self.read()? else {
            return Ok(None);
        };
        Ok(Some(RowCursor {
            schema: Arc::new(RowSchema::new(header)),
            reader: self,
        }))
    }

    /// Rows returned so far, header included.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Column names plus a name-to-position index.
///
/// Duplicate names resolve to their last position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowSchema {
    header: Vec<String>,
    index: HashMap<String, usize>,
}

impl RowSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let header: Vec<String> = columns.into_iter().map(Into::into).collect();
        let index = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { header, index }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn index(&self) -> &HashMap<String, usize> {
        &self.index
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// View a headerless row through this schema.
    pub fn record(self: &Arc<Self>, fields: Vec<String>) -> RowRecord {
        RowRecord {
            fields,
            schema: Arc::clone(self),
        }
    }
}

/// One row plus a shared reference to the schema that names its columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowRecord {
    fields: Vec<String>,
    schema: Arc<RowSchema>,
}

impl RowRecord {
    /// Raw field list.
    pub fn record(&self) -> &[String] {
        &self.fields
    }

    pub fn into_record(self) -> Vec<String> {
        self.fields
    }

    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }

    /// Value of column `name`, or `default` when the column is unknown or the
    /// row is too short to hold it.
    pub fn field<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.schema
            .position(name)
            .and_then(|i| self.fields.get(i))
            .map_or(default, String::as_str)
    }

    /// Column-name map of the whole row.
    ///
    /// Fields past the end of the header all map to the key `""`, so only the
    /// last of them survives.
    pub fn fields(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let name = self.schema.header.get(i).cloned().unwrap_or_default();
                (name, value.clone())
            })
            .collect()
    }
}

/// Header-aware cursor returned by [`RowReader::read_header`].
pub struct RowCursor<'r, R: Read> {
    reader: &'r mut RowReader<R>,
    schema: Arc<RowSchema>,
}

impl<R: Read> RowCursor<'_, R> {
    pub fn header(&self) -> &[String] {
        self.schema.header()
    }

    pub fn index(&self) -> &HashMap<String, usize> {
        self.schema.index()
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    /// Next row bound to the header schema, or `None` at end-of-stream.
    pub fn next_record(&mut self) -> Result<Option<RowRecord>> {
        Ok(self.reader.read()?.map(|fields| self.schema.record(fields)))
    }
}

impl<R: Read> Iterator for RowCursor<'_, R> {
    type Item = Result<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl<R: Read> RecordRead for RowReader<R> {
    type Record = Vec<String>;

    fn read_record(&mut self) -> Result<Option<Vec<String>>> {
        self.read()
    }
}

impl<W: Write> RecordWrite for RowWriter<W> {
    type Record = Vec<String>;

    fn write_record(&mut self, record: &Vec<String>) -> Result<()> {
        self.write(record)
    }

    fn close(self) -> Result<()> {
        RowWriter::close(self)
    }
}
