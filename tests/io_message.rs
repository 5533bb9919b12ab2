#![cfg(feature = "io-message")]

use anyhow::Result;
use recordfile::{
    Compression, Error, FileService, FileServiceConfig, MessageMarshaler, MessageReader,
    MessageWriter,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug, Default)]
struct Row {
    id: u64,
    name: String,
    tags: Vec<String>,
    score: f64,
}

fn row(id: u64) -> Row {
    Row {
        id,
        name: format!("name{id}"),
        tags: vec!["a".into(), format!("t{}", id % 3)],
        score: id as f64 * 0.5,
    }
}

#[test]
fn stream_round_trip_with_reused_holder() -> Result<()> {
    let fs = FileService::default();
    for gzip in [false, true] {
        let mut w = fs.new_message_stream(Vec::new(), gzip);
        for id in 0..10 {
            w.write(&row(id))?;
        }
        let bytes = w.finish()?;

        let mut r = fs.message_stream(&bytes[..], gzip)?;
        let mut holder = Row::default();
        let mut seen = Vec::new();
        while r.read_to(&mut holder)? {
            seen.push(holder.clone());
        }
        assert_eq!(seen, (0..10).map(row).collect::<Vec<_>>());
        r.close()?;
    }
    Ok(())
}

#[test]
fn frame_layout_is_big_endian_length_then_payload() -> Result<()> {
    let fs = FileService::default();
    let mut w = fs.new_message_buffer(false);
    let payload = w.write(&row(7))?;
    let bytes = w.finish()?;

    assert_eq!(bytes.len(), 4 + payload.len());
    assert_eq!(&bytes[..4], &(payload.len() as u32).to_be_bytes());
    assert_eq!(&bytes[4..], &payload[..]);
    assert_eq!(payload, postcard::to_allocvec(&row(7)).unwrap());
    Ok(())
}

#[test]
fn file_round_trip_plain_and_gzip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let fs = FileService::default();
    for name in ["rows.bin", "rows.bin.gz"] {
        let path = tmp.path().join(name);
        let mut w = fs.new_message_file(&path)?;
        for id in 0..25 {
            w.write(&row(id))?;
        }
        w.close()?;

        let mut r = fs.open_message_file(&path)?;
        let mut count = 0;
        while let Some(back) = r.read::<Row>()? {
            assert_eq!(back, row(count));
            count += 1;
        }
        assert_eq!(count, 25);
    }
    let plain = fs::read(tmp.path().join("rows.bin"))?;
    let gz = fs::read(tmp.path().join("rows.bin.gz"))?;
    assert_ne!(&plain[..2], &[0x1f, 0x8b]);
    assert_eq!(&gz[..2], &[0x1f, 0x8b]);
    Ok(())
}

#[test]
fn empty_stream_is_end_of_stream_not_error() -> Result<()> {
    let fs = FileService::default();
    let mut r = fs.message_stream(&b""[..], false)?;
    assert!(r.read_raw()?.is_none());
    assert!(r.read_raw()?.is_none());
    Ok(())
}

#[test]
fn truncated_prefix_is_io_error() -> Result<()> {
    let fs = FileService::default();
    let mut r = fs.message_stream(&[0u8, 0][..], false)?;
    let err = r.read_raw().unwrap_err();
    assert!(err.is_io());
    Ok(())
}

#[test]
fn truncated_payload_is_io_error() -> Result<()> {
    let fs = FileService::default();
    let mut bytes = fs.new_message_buffer(false);
    bytes.write(&row(1))?;
    let mut bytes = bytes.finish()?;
    bytes.truncate(bytes.len() - 1);

    let mut r = fs.message_stream(&bytes[..], false)?;
    let err = r.read::<Row>().unwrap_err();
    assert!(err.is_io());
    assert!(!err.is_decode());
    Ok(())
}

#[test]
fn truncation_after_complete_records_still_fails() -> Result<()> {
    let fs = FileService::default();
    let mut w = fs.new_message_buffer(false);
    w.write(&row(1))?;
    w.write(&row(2))?;
    let mut bytes = w.finish()?;
    bytes.extend_from_slice(&[0, 0, 0]);

    let mut r = fs.message_stream(&bytes[..], false)?;
    assert!(r.read::<Row>()?.is_some());
    assert!(r.read::<Row>()?.is_some());
    assert!(r.read::<Row>().unwrap_err().is_io());
    Ok(())
}

#[test]
fn undecodable_payload_is_decode_error() -> Result<()> {
    let fs = FileService::default();
    let mut w = fs.new_message_buffer(false);
    // a string length varint that points far past the payload
    w.write_raw(&[0x01, 0xff, 0xff, 0x03])?;
    let bytes = w.finish()?;
    let mut r = fs.message_stream(&bytes[..], false)?;
    let mut holder = Row::default();
    let err = r.read_to(&mut holder).unwrap_err();
    assert!(err.is_decode());
    Ok(())
}

#[test]
fn zero_length_payload_frames() -> Result<()> {
    let fs = FileService::default();
    let mut w = fs.new_message_buffer(false);
    w.write_raw(&[])?;
    w.write_raw(b"xyz")?;
    let bytes = w.finish()?;
    assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 3, b'x', b'y', b'z']);

    let mut r = fs.message_stream(&bytes[..], false)?;
    assert_eq!(r.read_raw()?, Some(vec![]));
    assert_eq!(r.read_raw()?, Some(b"xyz".to_vec()));
    assert_eq!(r.read_raw()?, None);
    Ok(())
}

#[test]
fn reader_with_one_byte_buffer() -> Result<()> {
    let cfg = FileServiceConfig {
        buffer_size: 1,
        ..Default::default()
    };
    let mut w = MessageWriter::new(Vec::new(), Compression::Gzip, &cfg);
    for id in 0..50 {
        w.write(&row(id))?;
    }
    let bytes = w.finish()?;
    let mut r = MessageReader::new(&bytes[..], Compression::Gzip, &cfg, "mem")?;
    let mut n = 0;
    while r.read::<Row>()?.is_some() {
        n += 1;
    }
    assert_eq!(n, 50);
    Ok(())
}

/// JSON payloads inside the length-prefixed framing.
struct JsonPayloads;

impl MessageMarshaler for JsonPayloads {
    fn marshal<T: Serialize + ?Sized>(&self, message: &T) -> recordfile::Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|_| Error::InvalidState("json encode"))
    }

    fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8], holder: &mut T) -> recordfile::Result<()> {
        *holder = serde_json::from_slice(bytes).map_err(|_| Error::InvalidState("json decode"))?;
        Ok(())
    }
}

#[test]
fn file_apis_accept_a_custom_marshaler() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("rows.json.bin");
    let fs = FileService::default();

    let mut w = fs.new_message_file_with_marshaler(&path, JsonPayloads)?;
    let payload = w.write(&row(3))?;
    w.close()?;
    assert_eq!(payload, serde_json::to_vec(&row(3))?);

    let bytes = fs::read(&path)?;
    assert_eq!(&bytes[..4], &(payload.len() as u32).to_be_bytes());
    assert_eq!(bytes[4], b'{');

    let mut r = fs.open_message_file_with_marshaler(&path, JsonPayloads)?;
    let mut holder = Row::default();
    assert!(r.read_to(&mut holder)?);
    assert_eq!(holder, row(3));
    assert!(!r.read_to(&mut holder)?);
    Ok(())
}
