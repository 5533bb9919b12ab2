#![cfg(feature = "io-jsonl")]

use anyhow::Result;
use recordfile::{
    Compression, Error, FileService, FileServiceConfig, JsonMarshaler, JsonReader, JsonWriter,
    ObjectMarshaler,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
struct Rec {
    id: u32,
    word: String,
}

fn obj(value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("test".to_string(), value.to_string())])
}

fn write_two<W: std::io::Write>(mut w: JsonWriter<W>) -> Result<W> {
    w.write(&obj("obj1"))?;
    w.write(&obj("obj2"))?;
    Ok(w.finish()?)
}

fn read_two<R: std::io::Read>(mut r: JsonReader<R>) -> Result<()> {
    let first: BTreeMap<String, String> = r.read()?.expect("first object");
    assert_eq!(first, obj("obj1"));
    let second: BTreeMap<String, String> = r.read()?.expect("second object");
    assert_eq!(second, obj("obj2"));
    assert!(r.read::<BTreeMap<String, String>>()?.is_none());
    r.close()?;
    Ok(())
}

#[test]
fn file_and_stream_produce_identical_bytes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("objects.json");
    let fs = FileService::default();

    write_two(fs.new_json_file(&path)?)?;
    let buf = write_two(fs.new_json_stream(Vec::new(), false))?;

    let content = fs::read(&path)?;
    assert_eq!(content, buf);
    assert_eq!(
        String::from_utf8(content.clone())?,
        "{\"test\":\"obj1\"}\n{\"test\":\"obj2\"}\n"
    );

    read_two(fs.json_stream(&content[..], false)?)?;
    read_two(fs.open_json_file(&path)?)?;
    Ok(())
}

#[test]
fn gzip_file_round_trip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("objects.json.gz");
    let fs = FileService::default();

    write_two(fs.new_json_file(&path)?)?;
    let raw = fs::read(&path)?;
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    read_two(fs.open_json_file(&path)?)?;
    Ok(())
}

#[test]
fn gzip_stream_round_trip() -> Result<()> {
    let fs = FileService::default();
    let bytes = write_two(fs.new_json_stream(Vec::new(), true))?;
    read_two(fs.json_stream(&bytes[..], true)?)?;
    Ok(())
}

#[test]
fn typed_records_via_iterator() -> Result<()> {
    let fs = FileService::default();
    let data = vec![
        Rec {
            id: 1,
            word: "hi".into(),
        },
        Rec {
            id: 2,
            word: "multi\nline".into(),
        },
    ];
    let mut w = fs.new_json_stream(Vec::new(), false);
    for rec in &data {
        w.write(rec)?;
    }
    assert_eq!(w.records_written(), 2);
    let bytes = w.finish()?;
    // embedded newlines are escaped by the marshaler
    assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 2);

    let mut r = fs.json_stream(&bytes[..], false)?;
    let back: Vec<Rec> = r.records().collect::<recordfile::Result<_>>()?;
    assert_eq!(back, data);
    Ok(())
}

#[test]
fn last_line_without_newline_is_a_record() -> Result<()> {
    let fs = FileService::default();
    let mut r = fs.json_stream(&b"{\"id\":1,\"word\":\"a\"}\n{\"id\":2,\"word\":\"b\"}"[..], false)?;
    assert_eq!(r.read::<Rec>()?.map(|r| r.id), Some(1));
    assert_eq!(r.read::<Rec>()?.map(|r| r.id), Some(2));
    assert!(r.read::<Rec>()?.is_none());
    Ok(())
}

#[test]
fn end_of_stream_is_sticky() -> Result<()> {
    let fs = FileService::default();
    let mut r = fs.json_stream(&b"{\"id\":1,\"word\":\"a\"}\n"[..], false)?;
    assert!(r.read::<Rec>()?.is_some());
    for _ in 0..3 {
        assert!(r.read::<Rec>()?.is_none());
        assert!(r.read_raw()?.is_none());
    }
    Ok(())
}

#[test]
fn raw_round_trip_preserves_bytes() -> Result<()> {
    let fs = FileService::default();
    let input = b"{\"b\":2,\"a\":1}\n{\"z\":[1,2,3]}\n";
    let mut r = fs.json_stream(&input[..], false)?;
    let mut w = fs.new_json_stream(Vec::new(), false);
    while let Some(line) = r.read_raw()? {
        w.write_raw(&line)?;
    }
    assert_eq!(w.finish()?, input.to_vec());
    Ok(())
}

#[test]
fn raw_line_with_newline_is_rejected() -> Result<()> {
    let fs = FileService::default();
    let mut w = fs.new_json_stream(Vec::new(), false);
    let err = w.write_raw(b"{}\n{}").unwrap_err();
    assert!(matches!(err, recordfile::Error::Encode { .. }));
    Ok(())
}

#[test]
fn decode_failure_surfaces_as_decode_error() -> Result<()> {
    let fs = FileService::default();
    let mut r = fs.json_stream(&b"not json\n"[..], false)?;
    let err = r.read::<Rec>().unwrap_err();
    assert!(err.is_decode());
    Ok(())
}

#[test]
fn gzip_reader_over_plain_data_fails_on_open() -> Result<()> {
    let fs = FileService::default();
    let err = fs.json_stream(&b"{\"id\":1}\n"[..], true).err().expect("open must fail");
    assert!(err.is_decode());
    Ok(())
}

#[test]
fn plain_file_named_gz_fails_on_open() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("lying.json.gz");
    fs::write(&path, "{\"id\":1}\n")?;
    let err = FileService::default()
        .open_json_file(&path)
        .err()
        .expect("open must fail");
    assert!(err.is_decode());
    assert!(err.to_string().contains("lying.json.gz"));
    Ok(())
}

#[test]
fn tiny_buffer_size_round_trip() -> Result<()> {
    let fs = FileService::new(FileServiceConfig {
        buffer_size: 7,
        ..Default::default()
    });
    let mut w = JsonWriter::new(Vec::new(), Compression::Gzip, fs.config());
    for i in 0..500 {
        w.write(&Rec {
            id: i,
            word: format!("word-{i}"),
        })?;
    }
    let bytes = w.finish()?;
    let mut r = JsonReader::new(&bytes[..], Compression::Gzip, fs.config(), "mem")?;
    let back: Vec<Rec> = r.records().collect::<recordfile::Result<_>>()?;
    assert_eq!(back.len(), 500);
    assert_eq!(back[499].word, "word-499");
    Ok(())
}

#[test]
fn missing_file_reports_path() {
    let err = FileService::default()
        .open_json_file("/definitely/not/here.jsonl")
        .err()
        .expect("open must fail");
    assert!(err.is_io());
    assert!(err.to_string().contains("/definitely/not/here.jsonl"));
}

#[test]
fn gzip_stream_cut_inside_header_fails_on_open() -> Result<()> {
    let fs = FileService::default();
    let gz = write_two(fs.new_json_stream(Vec::new(), true))?;
    for n in [3, 5, 9] {
        let err = fs.json_stream(&gz[..n], true).err().expect("open must fail");
        assert!(err.is_decode(), "{n} bytes: {err}");
    }
    Ok(())
}

/// Prefixes every line with a format tag.
struct Tagged;

impl ObjectMarshaler for Tagged {
    fn marshal<T: Serialize + ?Sized>(&self, object: &T) -> recordfile::Result<Vec<u8>> {
        let mut line = b"v1 ".to_vec();
        line.extend(JsonMarshaler.marshal(object)?);
        Ok(line)
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> recordfile::Result<T> {
        let body = bytes
            .strip_prefix(b"v1 ")
            .ok_or(Error::InvalidState("missing v1 tag"))?;
        JsonMarshaler.unmarshal(body)
    }
}

#[test]
fn file_apis_accept_a_custom_marshaler() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("tagged.json.gz");
    let fs = FileService::default();

    let mut w = fs.new_json_file_with_marshaler(&path, Tagged)?;
    w.write(&Rec {
        id: 1,
        word: "one".into(),
    })?;
    w.close()?;

    let mut raw = fs.open_json_file(&path)?;
    assert_eq!(
        raw.read_raw()?,
        Some(b"v1 {\"id\":1,\"word\":\"one\"}".to_vec())
    );

    let mut r = fs.open_json_file_with_marshaler(&path, Tagged)?;
    assert_eq!(r.read::<Rec>()?.map(|rec| rec.word), Some("one".to_string()));
    assert!(r.read::<Rec>()?.is_none());

    let mut plain = fs.open_json_file(&path)?;
    assert!(plain.read::<Rec>().unwrap_err().is_decode());
    Ok(())
}
