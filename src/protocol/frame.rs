//! Length-prefixed JSON frames
//!
//! Wire format: `[8 uppercase hex digits: body length] + [UTF-8 JSON body]`.
//! There is no delimiter between header and body and nothing after the
//! body. The codec never interprets the JSON; callers do.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::utils::preview;
use crate::common::{Error, Result};

/// Size of the ASCII length prefix
pub const HEADER_LEN: usize = 8;

/// Default upper bound for a frame body
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Render a body length as the 8-digit header
pub fn encode_header(len: u32) -> String {
    hex::encode_upper(len.to_be_bytes())
}

/// Parse the 8-digit header into a body length
pub fn parse_header(header: &[u8]) -> Result<u32> {
    if header.len() != HEADER_LEN {
        return Err(Error::Framing(format!(
            "length prefix must be {} bytes, got {}",
            HEADER_LEN,
            header.len()
        )));
    }

    let mut raw = [0u8; 4];
    hex::decode_to_slice(header, &mut raw).map_err(|e| {
        Error::Framing(format!("invalid length prefix '{}': {}", preview(header), e))
    })?;

    Ok(u32::from_be_bytes(raw))
}

/// Encode a payload into a complete frame
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Bytes> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| Error::Payload(format!("cannot serialize payload: {}", e)))?;

    let len = u32::try_from(body.len()).map_err(|_| {
        Error::Framing(format!(
            "payload of {} bytes does not fit the length prefix",
            body.len()
        ))
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_slice(encode_header(len).as_bytes());
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decode one complete frame held in memory
pub fn decode<T: DeserializeOwned>(frame: &[u8], max_len: usize) -> Result<T> {
    if frame.len() < HEADER_LEN {
        return Err(Error::Framing(format!(
            "truncated length prefix: {} of {} bytes",
            frame.len(),
            HEADER_LEN
        )));
    }

    let len = checked_len(&frame[..HEADER_LEN], max_len)?;
    let body = &frame[HEADER_LEN..];
    if body.len() < len {
        return Err(Error::Payload(format!(
            "connection closed after {} of {} bytes",
            body.len(),
            len
        )));
    }

    parse_body(&body[..len])
}

/// Read one frame body from a stream.
///
/// Returns `Ok(None)` when the peer closed the stream before sending a
/// single byte; that empty close is the protocol's "not ready" signal.
pub async fn read_body<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::Framing(format!(
                "connection closed inside length prefix ({} of {} bytes)",
                filled, HEADER_LEN
            )));
        }
        filled += n;
    }

    let len = checked_len(&header, max_len)?;
    let mut body = vec![0u8; len];
    let mut received = 0;
    while received < len {
        let n = reader.read(&mut body[received..]).await?;
        if n == 0 {
            return Err(Error::Payload(format!(
                "connection closed after {} of {} bytes",
                received, len
            )));
        }
        received += n;
    }

    Ok(Some(body))
}

/// Read and parse one frame from a stream (`None` on an empty close)
pub async fn read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_body(reader, max_len).await? {
        Some(body) => parse_body(&body).map(Some),
        None => Ok(None),
    }
}

/// Encode and write one frame, flushing the writer
pub async fn write_frame<W, T>(writer: &mut W, payload: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let frame = encode(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn checked_len(header: &[u8], max_len: usize) -> Result<usize> {
    let len = parse_header(header)? as usize;
    if len > max_len {
        return Err(Error::Framing(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, max_len
        )));
    }
    Ok(len)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        Error::Payload(format!("invalid JSON body '{}': {}", preview(body), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_header_is_fixed_width_uppercase() {
        assert_eq!(encode_header(0), "00000000");
        assert_eq!(encode_header(10), "0000000A");
        assert_eq!(encode_header(0xABCDEF), "00ABCDEF");
        assert_eq!(encode_header(u32::MAX), "FFFFFFFF");
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"0000000A").unwrap(), 10);
        assert_eq!(parse_header(b"0000000a").unwrap(), 10);
        assert!(matches!(parse_header(b"0000000G"), Err(Error::Framing(_))));
        assert!(matches!(parse_header(b"00A"), Err(Error::Framing(_))));
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(&json!({"a": 1})).unwrap();
        let body = br#"{"a":1}"#;
        assert_eq!(&frame[..HEADER_LEN], b"00000007");
        assert_eq!(&frame[HEADER_LEN..], body);
    }

    #[test]
    fn test_round_trip_nested_value() {
        let payload = json!({
            "group": "g1",
            "count": 2,
            "clients": {"A": "group_data", "B": "group_data"},
            "nested": [1, "two", null, {"k": true}],
            "unicode": "héllo ✓"
        });
        let frame = encode(&payload).unwrap();
        let decoded: Value = decode(&frame, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_length_counts_bytes_not_chars() {
        let frame = encode(&json!("✓")).unwrap();
        // quote + 3 UTF-8 bytes + quote
        assert_eq!(&frame[..HEADER_LEN], b"00000005");
    }

    #[test]
    fn test_decode_truncated_body_is_payload_error() {
        let mut frame = b"0000000A".to_vec();
        frame.extend_from_slice(b"{\"a\":");
        let result: Result<Value> = decode(&frame, DEFAULT_MAX_FRAME_LEN);
        assert!(matches!(result, Err(Error::Payload(_))));
    }

    #[test]
    fn test_decode_invalid_json_is_payload_error() {
        let result: Result<Value> = decode(b"00000003abc", DEFAULT_MAX_FRAME_LEN);
        assert!(matches!(result, Err(Error::Payload(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let result: Result<Value> = decode(b"00001000{}", 16);
        assert!(matches!(result, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let frame = encode(&json!({"request": "group_data"})).unwrap();
        let mut stream = tokio_test::io::Builder::new()
            .read(&frame[..3])
            .read(&frame[3..12])
            .read(&frame[12..])
            .build();

        let value: Option<Value> = read_frame(&mut stream, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        assert_eq!(value, Some(json!({"request": "group_data"})));
    }

    #[tokio::test]
    async fn test_read_frame_empty_close_is_none() {
        let mut stream = tokio_test::io::Builder::new().build();
        let value: Option<Value> = read_frame(&mut stream, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body() {
        let mut stream = tokio_test::io::Builder::new()
            .read(b"0000000A")
            .read(b"12345")
            .build();
        let result: Result<Option<Value>> = read_frame(&mut stream, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(result, Err(Error::Payload(_))));
    }

    #[tokio::test]
    async fn test_read_frame_partial_header_is_framing_error() {
        let mut stream = tokio_test::io::Builder::new().read(b"0000").build();
        let result: Result<Option<Value>> = read_frame(&mut stream, DEFAULT_MAX_FRAME_LEN).await;
        assert!(matches!(result, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let expected = encode(&json!({"ok": true})).unwrap();
        let mut stream = tokio_test::io::Builder::new().write(&expected).build();
        write_frame(&mut stream, &json!({"ok": true})).await.unwrap();
    }
}
