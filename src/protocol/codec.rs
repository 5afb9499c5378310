//! Binary codec and stream framing
//!
//! Encoding is a pure function of the message, so the broadcast path can
//! encode once per recipient without coordination.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::{ChatMessage, Message, PayloadMessage};
use super::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{Error, ProtocolError, Result};

const TYPE_JOIN_REQUEST: u8 = 0x01;
const TYPE_JOIN_RESPONSE: u8 = 0x02;
const TYPE_CHAT: u8 = 0x03;
const TYPE_PAYLOAD: u8 = 0x04;

/// Encode a message body (no length prefix)
pub fn encode(msg: &Message) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);

    match msg {
        Message::JoinRequest {
            identity,
            datagram_port,
        } => {
            buf.put_u8(TYPE_JOIN_REQUEST);
            put_str16(&mut buf, identity)?;
            buf.put_u16(*datagram_port);
        }
        Message::JoinResponse { available } => {
            buf.put_u8(TYPE_JOIN_RESPONSE);
            buf.put_u8(*available as u8);
        }
        Message::Chat(chat) => {
            buf.put_u8(TYPE_CHAT);
            put_str16(&mut buf, &chat.sender)?;
            put_bytes32(&mut buf, chat.body.as_bytes());
        }
        Message::Payload(payload) => {
            if payload.data.len() > MAX_PAYLOAD_SIZE {
                return Err(Error::PayloadTooLarge {
                    size: payload.data.len(),
                    max: MAX_PAYLOAD_SIZE,
                });
            }
            buf.put_u8(TYPE_PAYLOAD);
            put_str16(&mut buf, &payload.sender)?;
            put_bytes32(&mut buf, &payload.data);
        }
    }

    Ok(buf.freeze())
}

/// Body size of an encoded chat message
pub fn chat_encoded_len(chat: &ChatMessage) -> usize {
    1 + 2 + chat.sender.len() + 4 + chat.body.len()
}

/// Decode a complete message body
pub fn decode(data: &[u8]) -> std::result::Result<Message, ProtocolError> {
    let mut buf = data;
    if !buf.has_remaining() {
        return Err(ProtocolError::UnexpectedEof);
    }

    let msg = match buf.get_u8() {
        TYPE_JOIN_REQUEST => {
            let identity = get_str16(&mut buf)?;
            if buf.remaining() < 2 {
                return Err(ProtocolError::UnexpectedEof);
            }
            Message::JoinRequest {
                identity,
                datagram_port: buf.get_u16(),
            }
        }
        TYPE_JOIN_RESPONSE => {
            if !buf.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }
            Message::JoinResponse {
                available: buf.get_u8() != 0,
            }
        }
        TYPE_CHAT => {
            let sender = get_str16(&mut buf)?;
            let body = get_bytes32(&mut buf)?;
            let body = String::from_utf8(body.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;
            Message::Chat(ChatMessage { sender, body })
        }
        TYPE_PAYLOAD => {
            let sender = get_str16(&mut buf)?;
            let data = Bytes::copy_from_slice(get_bytes32(&mut buf)?);
            Message::Payload(PayloadMessage { sender, data })
        }
        other => return Err(ProtocolError::UnknownMessageType(other)),
    };

    if buf.has_remaining() {
        return Err(ProtocolError::TrailingBytes(buf.remaining()));
    }

    Ok(msg)
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1..]).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len).into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(decode(&body)?))
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = encode(msg)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(Error::PayloadTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn put_str16(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(Error::PayloadTooLarge {
            size: s.len(),
            max: u16::MAX as usize,
        });
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_bytes32(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn get_str16(buf: &mut &[u8]) -> std::result::Result<String, ProtocolError> {
    if buf.remaining() < 2 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    let s = std::str::from_utf8(&buf[..len]).map_err(|_| ProtocolError::InvalidUtf8)?;
    let s = s.to_owned();
    buf.advance(len);
    Ok(s)
}

fn get_bytes32<'a>(buf: &mut &'a [u8]) -> std::result::Result<&'a [u8], ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    let slice: &'a [u8] = *buf;
    let (data, rest) = slice.split_at(len);
    *buf = rest;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_roundtrip() {
        let chat = ChatMessage::new("alice", "hello, wörld");
        let msg = Message::Chat(chat.clone());
        let encoded = encode(&msg).unwrap();
        assert_eq!(encoded.len(), chat_encoded_len(&chat));
        assert_eq!(decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_payload_roundtrip() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let msg = Message::Payload(PayloadMessage::new("bob", data));
        let encoded = encode(&msg).unwrap();
        assert_eq!(decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_join_request_layout() {
        let msg = Message::JoinRequest {
            identity: "al".into(),
            datagram_port: 0x1F90,
        };
        let encoded = encode(&msg).unwrap();
        assert_eq!(&encoded[..], &[0x01, 0x00, 0x02, b'a', b'l', 0x1F, 0x90]);
        assert_eq!(decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_payload_too_large() {
        let msg = Message::Payload(PayloadMessage::new("bob", vec![0u8; MAX_PAYLOAD_SIZE + 1]));
        assert!(matches!(
            encode(&msg),
            Err(Error::PayloadTooLarge { max: MAX_PAYLOAD_SIZE, .. })
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let msg = Message::Payload(PayloadMessage::new("bob", vec![7u8; 2048]));
        let encoded = encode(&msg).unwrap();
        // What a fixed 1024-byte receive buffer would have kept
        assert_eq!(decode(&encoded[..1024]), Err(ProtocolError::UnexpectedEof));
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(decode(&[0x42]), Err(ProtocolError::UnknownMessageType(0x42)));
        assert_eq!(decode(&[]), Err(ProtocolError::UnexpectedEof));
    }

    #[test]
    fn test_trailing_bytes() {
        assert_eq!(decode(&[0x02, 0x01, 0xFF]), Err(ProtocolError::TrailingBytes(1)));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(
            decode(&[0x03, 0x00, 0x01, 0xFF, 0, 0, 0, 0]),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[tokio::test]
    async fn test_read_frame() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x02])
            .read(&[0x02, 0x01])
            .build();

        let msg = read_frame(&mut reader).await.unwrap();
        assert_eq!(msg, Some(Message::JoinResponse { available: true }));
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_too_large() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x10, 0x00, 0x01])
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::FrameTooLarge(_))));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_read_frame_eof_mid_frame() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x08, 0x03])
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_write_then_read_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let first = Message::Chat(ChatMessage::new("alice", "one"));
        let second = Message::Chat(ChatMessage::new("alice", "two"));

        write_frame(&mut a, &first).await.unwrap();
        write_frame(&mut a, &second).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(first));
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(second));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }
}
