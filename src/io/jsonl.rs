//! JSON Lines record codec.
//!
//! This module provides:
//! - [`JsonWriter`]: one compact JSON document per line, terminated by `\n`
//! - [`JsonReader`]: line scanner that decodes each line, or hands it back raw
//! - [`ObjectMarshaler`]: the seam for the object encoding, with
//!   [`JsonMarshaler`] (serde_json, compact) as the default
//!
//! # Notes
//! - A final line without a trailing `\n` is still a record; the read after it
//!   reports end-of-stream.
//! - End-of-stream is sticky: once a reader returns `Ok(None)` it keeps doing so.
//! - Raw reads strip the `\n`; raw writes add it back, so a raw copy of a file
//!   whose last line is terminated reproduces it byte for byte.

use crate::config::FileServiceConfig;
use crate::error::{Error, IoContext, Result};
use crate::io::compression::{read_error, Compression, SinkStack, SourceStack};
use crate::io::split::{RecordRead, RecordWrite};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{BufRead, Read, Write};
use std::marker::PhantomData;

/// Reversible encoding of an object into a single line of bytes.
///
/// Implementations must never emit a raw `\n`; writers reject output that does.
pub trait ObjectMarshaler {
    fn marshal<T: Serialize + ?Sized>(&self, object: &T) -> Result<Vec<u8>>;
    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Compact serde_json encoding. Newlines inside strings are escaped, so every
/// document fits on one line.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMarshaler;

impl ObjectMarshaler for JsonMarshaler {
    fn marshal<T: Serialize + ?Sized>(&self, object: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(object).map_err(|e| Error::encode("json object", e))
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            Error::decode(
                format!("json line {:?}", String::from_utf8_lossy(bytes)),
                e,
            )
        })
    }
}

/// Writes objects as JSON Lines over a (possibly gzip-compressed) stream.
pub struct JsonWriter<W: Write, M: ObjectMarshaler = JsonMarshaler> {
    sink: SinkStack<W>,
    marshaler: M,
    label: String,
    written: u64,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(inner: W, compression: Compression, config: &FileServiceConfig) -> Self {
        Self::with_marshaler(inner, compression, config, JsonMarshaler)
    }
}

impl<W: Write, M: ObjectMarshaler> JsonWriter<W, M> {
    pub fn with_marshaler(
        inner: W,
        compression: Compression,
        config: &FileServiceConfig,
        marshaler: M,
    ) -> Self {
        Self {
            sink: SinkStack::new(inner, compression, config),
            marshaler,
            label: "stream".to_string(),
            written: 0,
        }
    }

    pub(crate) fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Marshal `object` and append it as one line.
    pub fn write<T: Serialize + ?Sized>(&mut self, object: &T) -> Result<()> {
        let mut line = self.marshaler.marshal(object)?;
        if line.contains(&b'\n') {
            return Err(Error::encode(
                format!("json line for '{}'", self.label),
                "marshaled object contains a raw newline",
            ));
        }
        line.push(b'\n');
        self.sink
            .write_all(&line)
            .io_context(|| format!("write json line to '{}'", self.label))?;
        self.written += 1;
        Ok(())
    }

    /// Append an already encoded line. `raw` must not contain `\n`.
    pub fn write_raw(&mut self, raw: &[u8]) -> Result<()> {
        if raw.contains(&b'\n') {
            return Err(Error::encode(
                format!("raw json line for '{}'", self.label),
                "raw line contains a newline",
            ));
        }
        self.sink
            .write_all(raw)
            .and_then(|_| self.sink.write_all(b"\n"))
            .io_context(|| format!("write json line to '{}'", self.label))?;
        self.written += 1;
        Ok(())
    }

    /// Number of lines written so far.
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Flush and finalize the stream stack, returning the raw writer.
    pub fn finish(self) -> Result<W> {
        self.sink.finish()
    }

    pub fn close(self) -> Result<()> {
        self.finish().map(drop)
    }
}

/// Reads JSON Lines from a (possibly gzip-compressed) stream.
pub struct JsonReader<R: Read, M: ObjectMarshaler = JsonMarshaler> {
    source: SourceStack<R>,
    marshaler: M,
    label: String,
    done: bool,
}

impl<R: Read> JsonReader<R> {
    pub fn new(
        inner: R,
        compression: Compression,
        config: &FileServiceConfig,
        label: impl Into<String>,
    ) -> Result<Self> {
        Self::with_marshaler(inner, compression, config, label, JsonMarshaler)
    }
}

impl<R: Read, M: ObjectMarshaler> JsonReader<R, M> {
    pub fn with_marshaler(
        inner: R,
        compression: Compression,
        config: &FileServiceConfig,
        label: impl Into<String>,
        marshaler: M,
    ) -> Result<Self> {
        let label = label.into();
        let source = SourceStack::new(inner, compression, config, &label)?;
        Ok(Self {
            source,
            marshaler,
            label,
            done: false,
        })
    }

    /// Next line without its `\n`, or `None` at end-of-stream.
    pub fn read_raw(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let mut line = Vec::new();
        let n = self
            .source
            .read_until(b'\n', &mut line)
            .map_err(|e| read_error(format!("read json line in '{}'", self.label), e))?;
        if n == 0 {
            self.done = true;
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        } else {
            // unterminated last line
            self.done = true;
        }
        Ok(Some(line))
    }

    /// Next decoded object, or `None` at end-of-stream.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.read_raw()? {
            Some(line) => self.marshaler.unmarshal(&line).map(Some),
            None => Ok(None),
        }
    }

    /// Iterate over the remaining objects.
    pub fn records<T: DeserializeOwned>(&mut self) -> Records<'_, R, M, T> {
        Records {
            reader: self,
            _marker: PhantomData,
        }
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Iterator returned by [`JsonReader::records`].
pub struct Records<'a, R: Read, M: ObjectMarshaler, T> {
    reader: &'a mut JsonReader<R, M>,
    _marker: PhantomData<fn() -> T>,
}

impl<R: Read, M: ObjectMarshaler, T: DeserializeOwned> Iterator for Records<'_, R, M, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read().transpose()
    }
}

impl<R: Read, M: ObjectMarshaler> RecordRead for JsonReader<R, M> {
    type Record = Vec<u8>;

    fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_raw()
    }
}

impl<W: Write, M: ObjectMarshaler> RecordWrite for JsonWriter<W, M> {
    type Record = Vec<u8>;

    fn write_record(&mut self, record: &Vec<u8>) -> Result<()> {
        self.write_raw(record)
    }

    fn close(self) -> Result<()> {
        JsonWriter::close(self)
    }
}
