//! Length-prefixed field codec over an async byte stream.
//!
//! Field formats:
//!   bytes   [u32 big-endian length][payload...]
//!   text    bytes frame holding UTF-8
//!   i64     8 raw big-endian bytes
//!   status  text frame holding one of the five status tokens

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sft_core::Status;

use crate::FramingError;

pub struct WireCodec<RW> {
    io: RW,
    max_frame_len: u32,
}

impl<RW> WireCodec<RW> {
    pub fn new(io: RW, max_frame_len: u32) -> Self {
        Self { io, max_frame_len }
    }

    pub fn into_inner(self) -> RW {
        self.io
    }
}

fn map_io_err(e: std::io::Error) -> FramingError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FramingError::UnexpectedEof
    } else {
        FramingError::Io(e)
    }
}

impl<RW> WireCodec<RW>
where
    RW: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Read one length-prefixed frame, waiting until all of it has arrived.
    pub async fn read_bytes(&mut self) -> Result<Vec<u8>, FramingError> {
        let mut len_buf = [0u8; 4];
        self.io.read_exact(&mut len_buf).await.map_err(map_io_err)?;

        let len = u32::from_be_bytes(len_buf);
        if len > self.max_frame_len {
            return Err(FramingError::FrameTooLarge {
                len: len.into(),
                max: self.max_frame_len,
            });
        }

        let mut payload = vec![0u8; len as usize];
        self.io.read_exact(&mut payload).await.map_err(map_io_err)?;
        Ok(payload)
    }

    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), FramingError> {
        let len: u32 = bytes
            .len()
            .try_into()
            .ok()
            .filter(|len| *len <= self.max_frame_len)
            .ok_or(FramingError::FrameTooLarge {
                len: bytes.len() as u64,
                max: self.max_frame_len,
            })?;

        self.io
            .write_all(&len.to_be_bytes())
            .await
            .map_err(map_io_err)?;
        self.io.write_all(bytes).await.map_err(map_io_err)?;
        Ok(())
    }

    pub async fn read_string(&mut self) -> Result<String, FramingError> {
        let bytes = self.read_bytes().await?;
        String::from_utf8(bytes).map_err(|_| FramingError::InvalidUtf8)
    }

    pub async fn write_str(&mut self, s: &str) -> Result<(), FramingError> {
        self.write_bytes(s.as_bytes()).await
    }

    pub async fn read_i64(&mut self) -> Result<i64, FramingError> {
        let mut buf = [0u8; 8];
        self.io.read_exact(&mut buf).await.map_err(map_io_err)?;
        Ok(i64::from_be_bytes(buf))
    }

    pub async fn write_i64(&mut self, value: i64) -> Result<(), FramingError> {
        self.io
            .write_all(&value.to_be_bytes())
            .await
            .map_err(map_io_err)
    }

    pub async fn read_status(&mut self) -> Result<Status, FramingError> {
        let token = self.read_string().await?;
        token
            .parse()
            .map_err(|_| FramingError::UnknownStatus(token))
    }

    /// Write a status token and flush it to the peer.
    pub async fn write_status(&mut self, status: Status) -> Result<(), FramingError> {
        self.write_str(status.as_str()).await?;
        self.flush().await
    }

    pub async fn flush(&mut self) -> Result<(), FramingError> {
        self.io.flush().await.map_err(map_io_err)
    }

    /// Flush and shut down the write half.
    pub async fn shutdown(&mut self) -> Result<(), FramingError> {
        self.io.shutdown().await.map_err(map_io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MAX_FRAME_LEN;
    use tokio::io;

    fn codec<RW>(io: RW) -> WireCodec<RW> {
        WireCodec::new(io, DEFAULT_MAX_FRAME_LEN)
    }

    #[tokio::test]
    async fn writes_big_endian_length_prefix() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0, 0, 0, 5])
            .write(b"admin")
            .build();

        let mut codec = codec(mock);
        codec.write_bytes(b"admin").await.unwrap();
    }

    #[tokio::test]
    async fn writes_i64_as_eight_raw_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0, 0, 0, 0, 0, 0, 0x01, 0x00])
            .write(&[0xFF; 8])
            .build();

        let mut codec = codec(mock);
        codec.write_i64(256).await.unwrap();
        codec.write_i64(-1).await.unwrap();
    }

    #[tokio::test]
    async fn writes_status_as_text_frame() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0, 0, 0, 7])
            .write(b"AUTH_OK")
            .build();

        let mut codec = codec(mock);
        codec.write_status(Status::AuthOk).await.unwrap();
    }

    #[tokio::test]
    async fn reads_fields_from_wire() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0, 0, 0, 8])
            .read(b"note.txt")
            .read(&42i64.to_be_bytes())
            .read(&[0, 0, 0, 18])
            .read(b"READY_FOR_TRANSFER")
            .build();

        let mut codec = codec(mock);
        assert_eq!(codec.read_string().await.unwrap(), "note.txt");
        assert_eq!(codec.read_i64().await.unwrap(), 42);
        assert_eq!(codec.read_status().await.unwrap(), Status::ReadyForTransfer);
    }

    #[tokio::test]
    async fn field_with_newlines_and_nul_survives() {
        let (a, b) = io::duplex(4096);
        let mut writer = codec(a);
        let mut reader = codec(b);

        let awkward = b"line one\nline two\r\n\0AUTH_OK\n";
        writer.write_bytes(awkward).await.unwrap();
        writer.write_bytes(b"").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(reader.read_bytes().await.unwrap(), awkward);
        assert_eq!(reader.read_bytes().await.unwrap(), b"");
    }

    #[tokio::test]
    async fn every_status_token_roundtrips() {
        let (a, b) = io::duplex(4096);
        let mut writer = codec(a);
        let mut reader = codec(b);

        for status in Status::ALL {
            writer.write_status(status).await.unwrap();
            assert_eq!(reader.read_status().await.unwrap(), status);
        }
    }

    #[tokio::test]
    async fn unknown_status_token_is_rejected() {
        let (a, b) = io::duplex(4096);
        let mut writer = codec(a);
        let mut reader = codec(b);

        writer.write_str("MAYBE_OK").await.unwrap();

        let err = reader.read_status().await.unwrap_err();
        assert!(matches!(err, FramingError::UnknownStatus(ref t) if t == "MAYBE_OK"));
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_rejected() {
        let (a, b) = io::duplex(4096);
        let mut writer = codec(a);
        let mut reader = codec(b);

        writer.write_bytes(&[0xC3, 0x28]).await.unwrap();

        let err = reader.read_string().await.unwrap_err();
        assert!(matches!(err, FramingError::InvalidUtf8));
    }

    #[tokio::test]
    async fn rejects_oversized_frame_length() {
        let (mut a, b) = io::duplex(4096);
        let mut reader = WireCodec::new(b, 8);

        a.write_all(&9u32.to_be_bytes()).await.unwrap();
        a.write_all(&[0u8; 9]).await.unwrap();

        match reader.read_bytes().await.unwrap_err() {
            FramingError::FrameTooLarge { len, max } => {
                assert_eq!(len, 9);
                assert_eq!(max, 8);
            }
            other => panic!("expected FrameTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refuses_to_write_oversized_frame() {
        let (a, _b) = io::duplex(4096);
        let mut writer = WireCodec::new(a, 4);

        let err = writer.write_bytes(b"hello").await.unwrap_err();
        assert!(matches!(err, FramingError::FrameTooLarge { len: 5, max: 4 }));
    }

    #[tokio::test]
    async fn unexpected_eof_reading_length() {
        let (mut a, b) = io::duplex(4096);
        let mut reader = codec(b);

        a.write_all(&[0, 0]).await.unwrap();
        drop(a);

        let err = reader.read_bytes().await.unwrap_err();
        assert!(matches!(err, FramingError::UnexpectedEof));
    }

    #[tokio::test]
    async fn unexpected_eof_reading_payload() {
        let (mut a, b) = io::duplex(4096);
        let mut reader = codec(b);

        // Claim 100 bytes, deliver 50, then close.
        a.write_all(&100u32.to_be_bytes()).await.unwrap();
        a.write_all(&[7u8; 50]).await.unwrap();
        drop(a);

        let err = reader.read_bytes().await.unwrap_err();
        assert!(matches!(err, FramingError::UnexpectedEof));
    }

    #[tokio::test]
    async fn unexpected_eof_reading_i64() {
        let (mut a, b) = io::duplex(4096);
        let mut reader = codec(b);

        a.write_all(&[0, 0, 0]).await.unwrap();
        drop(a);

        let err = reader.read_i64().await.unwrap_err();
        assert!(matches!(err, FramingError::UnexpectedEof));
    }
}
