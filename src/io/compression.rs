//! Stream stacks: raw I/O with optional, transparent gzip compression.
//!
//! Every record reader and writer in this crate owns exactly one stack:
//!
//! ```text
//! write side:  codec -> [buffer -> gzip] -> buffer -> raw W
//! read side:   codec <- [buffer <- gunzip] <- buffer <- raw R
//! ```
//!
//! The bracketed layers exist only when compression is selected, either by an
//! explicit flag (stream APIs) or by a literal `.gz` path suffix (file APIs).
//!
//! ## Teardown
//! [`SinkStack::finish`] tears the layers down innermost first: the codec-side
//! buffer is flushed, the gzip encoder writes its trailer, then the raw buffer
//! is flushed and the raw writer handed back. Every layer is attempted even if
//! an earlier one fails; the first failure is reported. Dropping a stack
//! without `finish` still flushes on a best-effort basis.
//!
//! ## Validation
//! [`SourceStack::new`] reads and checks the fixed 10-byte gzip header up
//! front, so opening a compressed reader over plain, empty or cut-off data
//! fails with a decode error before the first record is requested.

use crate::config::FileServiceConfig;
use crate::error::{Error, IoContext, Result};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, BufRead, BufReader, BufWriter, Chain, Cursor, Read, Write};
use std::path::Path;

/// Path suffix that selects gzip for file-based APIs.
pub const GZIP_SUFFIX: &str = ".gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_HEADER_LEN: usize = 10;
const GZIP_METHOD_DEFLATE: u8 = 8;
const GZIP_RESERVED_FLAGS: u8 = 0xe0;

/// Compression applied between raw I/O and the record codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Plain,
    Gzip,
}

impl Compression {
    /// Infer compression from a path: a literal `.gz` suffix means gzip.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        if path
            .as_ref()
            .as_os_str()
            .to_string_lossy()
            .ends_with(GZIP_SUFFIX)
        {
            Compression::Gzip
        } else {
            Compression::Plain
        }
    }

    pub fn is_gzip(self) -> bool {
        self == Compression::Gzip
    }
}

impl From<bool> for Compression {
    fn from(gzip: bool) -> Self {
        if gzip {
            Compression::Gzip
        } else {
            Compression::Plain
        }
    }
}

enum SinkLayers<W: Write> {
    Plain(BufWriter<W>),
    Gzip(BufWriter<GzEncoder<BufWriter<W>>>),
}

/// Write side of a stream stack.
pub struct SinkStack<W: Write> {
    layers: SinkLayers<W>,
}

impl<W: Write> SinkStack<W> {
    pub fn new(inner: W, compression: Compression, config: &FileServiceConfig) -> Self {
        let size = config.effective_buffer_size();
        let raw = BufWriter::with_capacity(size, inner);
        let layers = match compression {
            Compression::Plain => SinkLayers::Plain(raw),
            Compression::Gzip => {
                let gz = GzEncoder::new(raw, config.gzip_level());
                SinkLayers::Gzip(BufWriter::with_capacity(size, gz))
            }
        };
        Self { layers }
    }

    pub fn compression(&self) -> Compression {
        match self.layers {
            SinkLayers::Plain(_) => Compression::Plain,
            SinkLayers::Gzip(_) => Compression::Gzip,
        }
    }

    /// The raw writer at the bottom of the stack.
    pub fn get_ref(&self) -> &W {
        match &self.layers {
            SinkLayers::Plain(buf) => buf.get_ref(),
            SinkLayers::Gzip(buf) => buf.get_ref().get_ref().get_ref(),
        }
    }

    /// Flush and finalize every layer, returning the raw writer.
    pub fn finish(self) -> Result<W> {
        match self.layers {
            SinkLayers::Plain(buf) => buf
                .into_inner()
                .map_err(|e| Error::io("flush stream", e.into_error())),
            SinkLayers::Gzip(outer) => {
                let mut first = None;
                let mut encoder = unwrap_buffer(outer, &mut first);
                let inner = match encoder.try_finish() {
                    Ok(()) => match encoder.finish() {
                        Ok(raw) => Some(unwrap_buffer(raw, &mut first)),
                        Err(e) => {
                            first.get_or_insert(e);
                            None
                        }
                    },
                    Err(e) => {
                        // the raw buffer still gets its flush
                        let flushed = encoder.get_mut().flush();
                        first.get_or_insert(e);
                        if let Err(e) = flushed {
                            first.get_or_insert(e);
                        }
                        None
                    }
                };
                match (first, inner) {
                    (Some(e), _) => Err(Error::io("close gzip stream", e)),
                    (None, Some(inner)) => Ok(inner),
                    (None, None) => Err(Error::InvalidState("gzip stream lost its writer")),
                }
            }
        }
    }
}

/// Take the writer out of a `BufWriter`, recording a flush failure instead of
/// losing the inner writer.
fn unwrap_buffer<W: Write>(buf: BufWriter<W>, first: &mut Option<io::Error>) -> W {
    match buf.into_inner() {
        Ok(inner) => inner,
        Err(e) => {
            let (err, buf) = e.into_parts();
            first.get_or_insert(err);
            buf.into_parts().0
        }
    }
}

impl<W: Write> Write for SinkStack<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.layers {
            SinkLayers::Plain(w) => w.write(buf),
            SinkLayers::Gzip(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.layers {
            SinkLayers::Plain(w) => w.write_all(buf),
            SinkLayers::Gzip(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.layers {
            SinkLayers::Plain(w) => w.flush(),
            SinkLayers::Gzip(w) => w.flush(),
        }
    }
}

type GzipSource<R> = MultiGzDecoder<Chain<Cursor<[u8; GZIP_HEADER_LEN]>, BufReader<R>>>;

enum SourceLayers<R: Read> {
    Plain(BufReader<R>),
    Gzip(BufReader<GzipSource<R>>),
}

/// Read side of a stream stack.
pub struct SourceStack<R: Read> {
    layers: SourceLayers<R>,
}

impl<R: Read> SourceStack<R> {
    /// Build the stack; `label` names the stream in errors.
    pub fn new(
        inner: R,
        compression: Compression,
        config: &FileServiceConfig,
        label: &str,
    ) -> Result<Self> {
        let size = config.effective_buffer_size();
        let mut raw = BufReader::with_capacity(size, inner);
        let layers = match compression {
            Compression::Plain => SourceLayers::Plain(raw),
            Compression::Gzip => {
                let header = read_gzip_header(&mut raw, label)?;
                let decoder = MultiGzDecoder::new(Cursor::new(header).chain(raw));
                SourceLayers::Gzip(BufReader::with_capacity(size, decoder))
            }
        };
        Ok(Self { layers })
    }

    pub fn compression(&self) -> Compression {
        match self.layers {
            SourceLayers::Plain(_) => Compression::Plain,
            SourceLayers::Gzip(_) => Compression::Gzip,
        }
    }
}

/// Read the fixed part of the first gzip member header and validate it.
fn read_gzip_header<R: Read>(raw: &mut BufReader<R>, label: &str) -> Result<[u8; GZIP_HEADER_LEN]> {
    let mut header = [0u8; GZIP_HEADER_LEN];
    let n = read_full(raw, &mut header).io_context(|| format!("gzip read error in '{label}'"))?;
    let magic = n.min(GZIP_MAGIC.len());
    let problem = if n == 0 {
        Some("empty stream")
    } else if header[..magic] != GZIP_MAGIC[..magic] {
        Some("stream is not gzip compressed")
    } else if n < GZIP_HEADER_LEN {
        Some("truncated gzip header")
    } else if header[2] != GZIP_METHOD_DEFLATE {
        Some("unsupported gzip compression method")
    } else if header[3] & GZIP_RESERVED_FLAGS != 0 {
        Some("reserved gzip header flags set")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(Error::decode(format!("gzip header in '{label}'"), problem)),
        None => Ok(header),
    }
}

/// Fill `buf` as far as the stream allows; returns the byte count read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<R: Read> Read for SourceStack<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.layers {
            SourceLayers::Plain(r) => r.read(buf),
            SourceLayers::Gzip(r) => r.read(buf),
        }
    }
}

impl<R: Read> BufRead for SourceStack<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match &mut self.layers {
            SourceLayers::Plain(r) => r.fill_buf(),
            SourceLayers::Gzip(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match &mut self.layers {
            SourceLayers::Plain(r) => r.consume(amt),
            SourceLayers::Gzip(r) => r.consume(amt),
        }
    }
}

/// Classify a read failure: corrupt compressed data is a decode error, the
/// rest are I/O errors.
pub(crate) fn read_error(context: impl Into<String>, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => Error::decode(context, err),
        _ => Error::io(context, err),
    }
}
