//! Length-prefixed binary message codec.
//!
//! Each record is framed as a 4-byte big-endian payload length followed by
//! exactly that many bytes of encoded message:
//!
//! ```text
//! [len: u32 BE][payload: len bytes][len: u32 BE][payload] ...
//! ```
//!
//! End-of-stream is only recognized when no byte at all is available where a
//! length prefix would start. Running out of bytes inside a prefix or inside a
//! payload is a truncated record and fails with an I/O error.

use crate::config::FileServiceConfig;
use crate::error::{Error, IoContext, Result};
use crate::io::compression::{read_error, read_full, Compression, SinkStack, SourceStack};
use crate::io::split::{RecordRead, RecordWrite};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Read, Write};

const PREFIX_LEN: usize = 4;

/// Reversible encoding of a typed message into a binary blob.
pub trait MessageMarshaler {
    fn marshal<T: Serialize + ?Sized>(&self, message: &T) -> Result<Vec<u8>>;

    /// Decode `bytes` into `holder`. On failure the holder must be discarded.
    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8], holder: &mut T) -> Result<()>;
}

/// postcard encoding: compact, deterministic, serde-driven.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardMarshaler;

impl MessageMarshaler for PostcardMarshaler {
    fn marshal<T: Serialize + ?Sized>(&self, message: &T) -> Result<Vec<u8>> {
        postcard::to_allocvec(message).map_err(|e| Error::encode("message", e.to_string()))
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8], holder: &mut T) -> Result<()> {
        *holder = postcard::from_bytes(bytes)
            .map_err(|e| Error::decode(format!("message of {} bytes", bytes.len()), e.to_string()))?;
        Ok(())
    }
}

/// Writes length-prefixed messages over a (possibly gzip-compressed) stream.
pub struct MessageWriter<W: Write, M: MessageMarshaler = PostcardMarshaler> {
    sink: SinkStack<W>,
    marshaler: M,
    label: String,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(inner: W, compression: Compression, config: &FileServiceConfig) -> Self {
        Self::with_marshaler(inner, compression, config, PostcardMarshaler)
    }
}

impl<W: Write, M: MessageMarshaler> MessageWriter<W, M> {
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
        }
    }

    pub(crate) fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Marshal and frame `message`, returning the encoded payload.
    pub fn write<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<Vec<u8>> {
        let payload = self.marshaler.marshal(message)?;
        self.write_raw(&payload)?;
        Ok(payload)
    }

    /// Frame an already encoded payload.
    pub fn write_raw(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            Error::encode(
                format!("message for '{}'", self.label),
                format!("payload of {} bytes exceeds the u32 length prefix", payload.len()),
            )
        })?;
        // write_all fails with WriteZero on a short write
        self.sink
            .write_all(&len.to_be_bytes())
            .io_context(|| format!("write length prefix to '{}'", self.label))?;
        self.sink
            .write_all(payload)
            .io_context(|| format!("write message payload to '{}'", self.label))
    }

    pub fn finish(self) -> Result<W> {
        self.sink.finish()
    }

    pub fn close(self) -> Result<()> {
        self.finish().map(drop)
    }
}

/// Reads length-prefixed messages from a (possibly gzip-compressed) stream.
pub struct MessageReader<R: Read, M: MessageMarshaler = PostcardMarshaler> {
    source: SourceStack<R>,
    marshaler: M,
    label: String,
    capacity_hint: usize,
    done: bool,
}

impl<R: Read> MessageReader<R> {
    pub fn new(
        inner: R,
        compression: Compression,
        config: &FileServiceConfig,
        label: impl Into<String>,
    ) -> Result<Self> {
        Self::with_marshaler(inner, compression, config, label, PostcardMarshaler)
    }
}

impl<R: Read, M: MessageMarshaler> MessageReader<R, M> {
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
            capacity_hint: config.effective_buffer_size(),
            done: false,
        })
    }

    /// Next framed payload, or `None` at end-of-stream.
    pub fn read_raw(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let mut prefix = [0u8; PREFIX_LEN];
        let got = read_full(&mut self.source, &mut prefix)
            .map_err(|e| read_error(format!("read length prefix in '{}'", self.label), e))?;
        match got {
            0 => {
                self.done = true;
                return Ok(None);
            }
            PREFIX_LEN => {}
            n => {
                return Err(truncated(
                    format!("read length prefix in '{}'", self.label),
                    n,
                    PREFIX_LEN,
                ));
            }
        }

        let len = u32::from_be_bytes(prefix) as usize;
        // Grow with the data rather than trusting the prefix for the allocation.
        let mut payload = Vec::with_capacity(len.min(self.capacity_hint));
        Read::by_ref(&mut self.source)
            .take(len as u64)
            .read_to_end(&mut payload)
            .map_err(|e| read_error(format!("read message payload in '{}'", self.label), e))?;
        if payload.len() != len {
            return Err(truncated(
                format!("read message payload in '{}'", self.label),
                payload.len(),
                len,
            ));
        }
        Ok(Some(payload))
    }

    /// Decode the next message into `holder`, reusing it across calls.
    ///
    /// Returns `Ok(false)` at end-of-stream. After an error the holder may be
    /// partially updated and must not be trusted.
    pub fn read_to<T: DeserializeOwned>(&mut self, holder: &mut T) -> Result<bool> {
        match self.read_raw()? {
            Some(payload) => {
                self.marshaler.unmarshal(&payload, holder)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Decode the next message into a fresh value.
    pub fn read<T: DeserializeOwned + Default>(&mut self) -> Result<Option<T>> {
        let mut holder = T::default();
        Ok(self.read_to(&mut holder)?.then_some(holder))
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

fn truncated(context: String, got: usize, expected: usize) -> Error {
    Error::io(
        context,
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated record: read {got} bytes, expected {expected}"),
        ),
    )
}

impl<R: Read, M: MessageMarshaler> RecordRead for MessageReader<R, M> {
    type Record = Vec<u8>;

    fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_raw()
    }
}

impl<W: Write, M: MessageMarshaler> RecordWrite for MessageWriter<W, M> {
    type Record = Vec<u8>;

    fn write_record(&mut self, record: &Vec<u8>) -> Result<()> {
        self.write_raw(record)
    }

    fn close(self) -> Result<()> {
        MessageWriter::close(self)
    }
}
