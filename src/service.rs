//! The record file service: one entry point that builds readers and writers
//! over paths or caller-supplied streams, and splits and joins record files.
//!
//! File-based APIs infer gzip from a `.gz` suffix; stream-based APIs take an
//! explicit `gzip` flag. All stacks share the service's [`FileServiceConfig`].

use crate::config::FileServiceConfig;
use crate::error::{IoContext, Result};
use crate::io::compression::Compression;
use crate::io::split::{self, RecordFormat};
use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(feature = "io-csv")]
use crate::io::csv::{RowReader, RowSchema, RowWriter, ValueTransform};
#[cfg(feature = "io-jsonl")]
use crate::io::jsonl::{JsonMarshaler, JsonReader, JsonWriter, ObjectMarshaler};
#[cfg(feature = "io-message")]
use crate::io::message::{MessageMarshaler, MessageReader, MessageWriter, PostcardMarshaler};
#[cfg(any(feature = "io-jsonl", feature = "io-csv", feature = "io-message"))]
use std::io::{Read, Write};
#[cfg(feature = "io-csv")]
use std::sync::Arc;

/// Builds record readers/writers and runs split/join.
#[derive(Clone, Debug, Default)]
pub struct FileService {
    config: FileServiceConfig,
}

impl FileService {
    pub fn new(config: FileServiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FileServiceConfig {
        &self.config
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.config.buffer_size = size;
    }

    fn create_file(&self, path: &Path) -> Result<File> {
        tracing::debug!(path = %path.display(), "creating record file");
        File::create(path).io_context(|| format!("file create error '{}'", path.display()))
    }

    fn open_file(&self, path: &Path) -> Result<File> {
        tracing::debug!(path = %path.display(), "opening record file");
        File::open(path).io_context(|| format!("file open error '{}'", path.display()))
    }
}

// ----------------------------------------------------------------------------
// JSON Lines
// ----------------------------------------------------------------------------

#[cfg(feature = "io-jsonl")]
impl FileService {
    pub fn new_json_stream<W: Write>(&self, inner: W, gzip: bool) -> JsonWriter<W> {
        JsonWriter::new(inner, Compression::from(gzip), &self.config)
    }

    pub fn new_json_file(&self, path: impl AsRef<Path>) -> Result<JsonWriter<File>> {
        self.new_json_file_with_marshaler(path, JsonMarshaler)
    }

    /// Like [`new_json_file`](Self::new_json_file), encoding objects with `marshaler`.
    pub fn new_json_file_with_marshaler<M: ObjectMarshaler>(
        &self,
        path: impl AsRef<Path>,
        marshaler: M,
    ) -> Result<JsonWriter<File, M>> {
        let path = path.as_ref();
        let file = self.create_file(path)?;
        Ok(
            JsonWriter::with_marshaler(file, Compression::from_path(path), &self.config, marshaler)
                .labeled(path.display().to_string()),
        )
    }

    pub fn json_stream<R: Read>(&self, inner: R, gzip: bool) -> Result<JsonReader<R>> {
        JsonReader::new(inner, Compression::from(gzip), &self.config, "stream")
    }

    pub fn open_json_file(&self, path: impl AsRef<Path>) -> Result<JsonReader<File>> {
        let path = path.as_ref();
        let file = self.open_file(path)?;
        self.json_file(file, path)
    }

    /// Like [`open_json_file`](Self::open_json_file), decoding objects with `marshaler`.
    pub fn open_json_file_with_marshaler<M: ObjectMarshaler>(
        &self,
        path: impl AsRef<Path>,
        marshaler: M,
    ) -> Result<JsonReader<File, M>> {
        let path = path.as_ref();
        let file = self.open_file(path)?;
        JsonReader::with_marshaler(
            file,
            Compression::from_path(path),
            &self.config,
            path.display().to_string(),
            marshaler,
        )
    }

    /// Reader over an already open file; `path` decides compression and labels errors.
    pub fn json_file(&self, file: File, path: impl AsRef<Path>) -> Result<JsonReader<File>> {
        let path = path.as_ref();
        JsonReader::new(
            file,
            Compression::from_path(path),
            &self.config,
            path.display().to_string(),
        )
    }

    /// Split a JSON Lines file into parts of at most `limit` lines.
    pub fn split_json_file<P>(
        &self,
        input: impl AsRef<Path>,
        limit: usize,
        part_path: P,
    ) -> Result<Vec<PathBuf>>
    where
        P: FnMut(usize) -> PathBuf,
    {
        split::split(&JsonlFormat(self), input.as_ref(), limit, part_path)
    }

    pub fn join_json_files<P: AsRef<Path>>(&self, output: impl AsRef<Path>, parts: &[P]) -> Result<()> {
        split::join(&JsonlFormat(self), output.as_ref(), parts)
    }
}

#[cfg(feature = "io-jsonl")]
struct JsonlFormat<'a>(&'a FileService);

#[cfg(feature = "io-jsonl")]
impl RecordFormat for JsonlFormat<'_> {
    type Record = Vec<u8>;
    type Reader = JsonReader<File>;
    type Writer = JsonWriter<File>;

    fn open(&self, path: &Path) -> Result<Self::Reader> {
        self.0.open_json_file(path)
    }

    fn create(&self, path: &Path) -> Result<Self::Writer> {
        self.0.new_json_file(path)
    }
}

// ----------------------------------------------------------------------------
// Length-prefixed messages
// ----------------------------------------------------------------------------

#[cfg(feature = "io-message")]
impl FileService {
    pub fn new_message_stream<W: Write>(&self, inner: W, gzip: bool) -> MessageWriter<W> {
        MessageWriter::new(inner, Compression::from(gzip), &self.config)
    }

    /// In-memory message writer; `finish()` hands back the encoded bytes.
    pub fn new_message_buffer(&self, gzip: bool) -> MessageWriter<Vec<u8>> {
        self.new_message_stream(Vec::new(), gzip)
    }

    pub fn new_message_file(&self, path: impl AsRef<Path>) -> Result<MessageWriter<File>> {
        self.new_message_file_with_marshaler(path, PostcardMarshaler)
    }

    /// Like [`new_message_file`](Self::new_message_file), encoding with `marshaler`.
    pub fn new_message_file_with_marshaler<M: MessageMarshaler>(
        &self,
        path: impl AsRef<Path>,
        marshaler: M,
    ) -> Result<MessageWriter<File, M>> {
        let path = path.as_ref();
        let file = self.create_file(path)?;
        Ok(
            MessageWriter::with_marshaler(file, Compression::from_path(path), &self.config, marshaler)
                .labeled(path.display().to_string()),
        )
    }

    pub fn message_stream<R: Read>(&self, inner: R, gzip: bool) -> Result<MessageReader<R>> {
        MessageReader::new(inner, Compression::from(gzip), &self.config, "stream")
    }

    pub fn open_message_file(&self, path: impl AsRef<Path>) -> Result<MessageReader<File>> {
        let path = path.as_ref();
        let file = self.open_file(path)?;
        self.message_file(file, path)
    }

    /// Like [`open_message_file`](Self::open_message_file), decoding with `marshaler`.
    pub fn open_message_file_with_marshaler<M: MessageMarshaler>(
        &self,
        path: impl AsRef<Path>,
        marshaler: M,
    ) -> Result<MessageReader<File, M>> {
        let path = path.as_ref();
        let file = self.open_file(path)?;
        MessageReader::with_marshaler(
            file,
            Compression::from_path(path),
            &self.config,
            path.display().to_string(),
            marshaler,
        )
    }

    /// Reader over an already open file; `path` decides compression and labels errors.
    pub fn message_file(&self, file: File, path: impl AsRef<Path>) -> Result<MessageReader<File>> {
        let path = path.as_ref();
        MessageReader::new(
            file,
            Compression::from_path(path),
            &self.config,
            path.display().to_string(),
        )
    }

    /// Split a message file into parts of at most `limit` messages.
    ///
    /// Frames are copied as-is, so no message type is needed.
    pub fn split_message_file<P>(
        &self,
        input: impl AsRef<Path>,
        limit: usize,
        part_path: P,
    ) -> Result<Vec<PathBuf>>
    where
        P: FnMut(usize) -> PathBuf,
    {
        split::split(&MessageFormat(self), input.as_ref(), limit, part_path)
    }

    pub fn join_message_files<P: AsRef<Path>>(
        &self,
        output: impl AsRef<Path>,
        parts: &[P],
    ) -> Result<()> {
        split::join(&MessageFormat(self), output.as_ref(), parts)
    }
}

#[cfg(feature = "io-message")]
struct MessageFormat<'a>(&'a FileService);

#[cfg(feature = "io-message")]
impl RecordFormat for MessageFormat<'_> {
    type Record = Vec<u8>;
    type Reader = MessageReader<File>;
    type Writer = MessageWriter<File>;

    fn open(&self, path: &Path) -> Result<Self::Reader> {
        self.0.open_message_file(path)
    }

    fn create(&self, path: &Path) -> Result<Self::Writer> {
        self.0.new_message_file(path)
    }
}

// ----------------------------------------------------------------------------
// CSV rows
// ----------------------------------------------------------------------------

#[cfg(feature = "io-csv")]
impl FileService {
    pub fn new_csv_stream<W: Write>(
        &self,
        inner: W,
        gzip: bool,
        transforms: &[ValueTransform],
    ) -> RowWriter<W> {
        RowWriter::new(inner, Compression::from(gzip), &self.config, transforms)
    }

    pub fn new_csv_file(
        &self,
        path: impl AsRef<Path>,
        transforms: &[ValueTransform],
    ) -> Result<RowWriter<File>> {
        let path = path.as_ref();
        let file = self.create_file(path)?;
        Ok(
            RowWriter::new(file, Compression::from_path(path), &self.config, transforms)
                .labeled(path.display().to_string()),
        )
    }

    pub fn open_csv_stream<R: Read>(
        &self,
        inner: R,
        gzip: bool,
        transforms: &[ValueTransform],
    ) -> Result<RowReader<R>> {
        RowReader::new(inner, Compression::from(gzip), &self.config, "stream", transforms)
    }

    pub fn open_csv_file(
        &self,
        path: impl AsRef<Path>,
        transforms: &[ValueTransform],
    ) -> Result<RowReader<File>> {
        let path = path.as_ref();
        let file = self.open_file(path)?;
        self.csv_file(file, path, transforms)
    }

    /// Reader over an already open file; `path` decides compression and labels errors.
    pub fn csv_file(
        &self,
        file: File,
        path: impl AsRef<Path>,
        transforms: &[ValueTransform],
    ) -> Result<RowReader<File>> {
        let path = path.as_ref();
        RowReader::new(
            file,
            Compression::from_path(path),
            &self.config,
            path.display().to_string(),
            transforms,
        )
    }

    /// Schema for headerless data whose columns are already known.
    pub fn new_csv_schema<I, S>(&self, columns: I) -> Arc<RowSchema>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(RowSchema::new(columns))
    }

    /// Split a CSV file with a header row into parts of at most `limit` data
    /// rows; every part starts with the header.
    pub fn split_csv_file<P>(
        &self,
        input: impl AsRef<Path>,
        limit: usize,
        part_path: P,
    ) -> Result<Vec<PathBuf>>
    where
        P: FnMut(usize) -> PathBuf,
    {
        split::split(&CsvFormat(self), input.as_ref(), limit, part_path)
    }

    /// Join CSV parts, writing the shared header once.
    pub fn join_csv_files<P: AsRef<Path>>(&self, output: impl AsRef<Path>, parts: &[P]) -> Result<()> {
        split::join(&CsvFormat(self), output.as_ref(), parts)
    }
}

#[cfg(feature = "io-csv")]
struct CsvFormat<'a>(&'a FileService);

#[cfg(feature = "io-csv")]
impl RecordFormat for CsvFormat<'_> {
    type Record = Vec<String>;
    type Reader = RowReader<File>;
    type Writer = RowWriter<File>;

    fn has_header(&self) -> bool {
        true
    }

    fn open(&self, path: &Path) -> Result<Self::Reader> {
        self.0.open_csv_file(path, &[])
    }

    fn create(&self, path: &Path) -> Result<Self::Writer> {
        self.0.new_csv_file(path, &[])
    }
}
