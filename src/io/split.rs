//! Format-generic split and join of record files.
//!
//! Both algorithms see a file only through a [`RecordFormat`]: a way to open a
//! reader and create a writer for a path, plus whether the first record of
//! every file is a header. Records pass through unchanged, so joining the
//! parts of a split reproduces the input byte stream whenever the codec's
//! encoding is deterministic.
//!
//! # Failure policy
//! - [`split`] is all-or-nothing: on any failure every part created so far is
//!   removed (removal errors are logged and swallowed) and the error returned.
//! - [`join`] stops at the first failure and leaves the partial output in
//!   place; the error names the offending part and stage.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Read side of a record stream: `Ok(None)` marks end-of-stream.
pub trait RecordRead {
    type Record;

    fn read_record(&mut self) -> Result<Option<Self::Record>>;
}

/// Write side of a record stream.
pub trait RecordWrite {
    type Record;

    fn write_record(&mut self, record: &Self::Record) -> Result<()>;

    /// Flush and finalize every layer of the stream.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// A record file format that split and join can drive.
pub trait RecordFormat {
    type Record: PartialEq;
    type Reader: RecordRead<Record = Self::Record>;
    type Writer: RecordWrite<Record = Self::Record>;

    /// Whether the first record of every file is a header that each part repeats.
    fn has_header(&self) -> bool {
        false
    }

    fn open(&self, path: &Path) -> Result<Self::Reader>;

    fn create(&self, path: &Path) -> Result<Self::Writer>;
}

/// Split `input` into parts of at most `limit` records each.
///
/// Part `i` (1-based) is written to `part_path(i)`. With a header format the
/// header is not counted against `limit` and is repeated as the first record
/// of every part. Returns the part paths in creation order; an empty input
/// produces no parts.
pub fn split<F, P>(format: &F, input: &Path, limit: usize, mut part_path: P) -> Result<Vec<PathBuf>>
where
    F: RecordFormat,
    P: FnMut(usize) -> PathBuf,
{
    if limit == 0 {
        return Err(Error::InvalidLimit(limit));
    }
    let mut reader = format.open(input)?;
    let header = if format.has_header() {
        match reader.read_record()? {
            Some(header) => Some(header),
            None => return Ok(Vec::new()),
        }
    } else {
        None
    };

    let mut parts = Vec::new();
    match split_into(format, &mut reader, header.as_ref(), limit, &mut part_path, &mut parts) {
        Ok(()) => {
            tracing::debug!(input = %input.display(), parts = parts.len(), "split complete");
            Ok(parts)
        }
        Err(err) => {
            for part in &parts {
                if let Err(e) = fs::remove_file(part) {
                    tracing::warn!(part = %part.display(), error = %e, "failed to remove split part");
                }
            }
            Err(err)
        }
    }
}

fn split_into<F, P>(
    format: &F,
    reader: &mut F::Reader,
    header: Option<&F::Record>,
    limit: usize,
    part_path: &mut P,
    parts: &mut Vec<PathBuf>,
) -> Result<()>
where
    F: RecordFormat,
    P: FnMut(usize) -> PathBuf,
{
    let mut current: Option<(F::Writer, PathBuf)> = None;
    let mut count = limit;

    while let Some(record) = reader.read_record()? {
        if count == limit {
            if let Some((writer, path)) = current.take() {
                writer
                    .close()
                    .map_err(|e| Error::partial_create(&path, e))?;
            }
            let path = part_path(parts.len() + 1);
            tracing::debug!(part = %path.display(), index = parts.len() + 1, "starting split part");
            let mut writer = format
                .create(&path)
                .map_err(|e| Error::partial_create(&path, e))?;
            parts.push(path.clone());
            if let Some(header) = header {
                writer
                    .write_record(header)
                    .map_err(|e| Error::partial_create(&path, e))?;
            }
            current = Some((writer, path));
            count = 0;
        }
        if let Some((writer, path)) = current.as_mut() {
            writer
                .write_record(&record)
                .map_err(|e| Error::partial_create(path.as_path(), e))?;
        }
        count += 1;
    }

    if let Some((writer, path)) = current {
        writer
            .close()
            .map_err(|e| Error::partial_create(&path, e))?;
    }
    Ok(())
}

/// Concatenate the records of `parts`, in order, into a new file at `output`.
///
/// With a header format the first part's header is written once; every other
/// part's header must match it and is skipped.
pub fn join<F, P>(format: &F, output: &Path, parts: &[P]) -> Result<()>
where
    F: RecordFormat,
    P: AsRef<Path>,
{
    let mut writer = format.create(output)?;
    let mut header: Option<F::Record> = None;

    for part in parts {
        let part = part.as_ref();
        tracing::debug!(part = %part.display(), output = %output.display(), "joining part");
        let mut reader = format
            .open(part)
            .map_err(|e| Error::join(part, "open", e))?;

        if format.has_header() {
            let part_header = reader
                .read_record()
                .map_err(|e| Error::join(part, "read header", e))?;
            match (&header, part_header) {
                (_, None) => {}
                (None, Some(h)) => {
                    writer
                        .write_record(&h)
                        .map_err(|e| Error::join(part, "write header", e))?;
                    header = Some(h);
                }
                (Some(first), Some(h)) => {
                    if *first != h {
                        return Err(Error::join(
                            part,
                            "header mismatch",
                            Error::InvalidState("part header differs from the first part's header"),
                        ));
                    }
                }
            }
        }

        while let Some(record) = reader
            .read_record()
            .map_err(|e| Error::join(part, "read", e))?
        {
            writer
                .write_record(&record)
                .map_err(|e| Error::join(part, "write", e))?;
        }
    }

    writer.close()
}
