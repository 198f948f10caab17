// Copyright 2023 Divy Srivastava <dj.srivastava23@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Owns one stream socket and its read buffer.
//!
//! `read_handshake` and `read_frame` both read in a loop until a complete
//! unit is available, an error is definitive, or the stream ends, mirroring
//! this crate's ancestor's own `parse_frame_header`, which reads in a loop
//! until it has enough bytes rather than returning a bare "would block"
//! signal to the caller. Under tokio, awaiting a socket read is already the
//! cooperative yield point; there's no separate poll step to model.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ConnectionError, FrameError};
use crate::frame::{Frame, Header};
use crate::handshake::{self, Request};

const READ_CHUNK: usize = 4096;

/// One connection's socket plus its incoming-byte buffer.
pub struct Transport<S> {
  stream: S,
  read_buf: Vec<u8>,
  max_receive_size: usize,
}

impl<S> Transport<S>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  pub fn new(stream: S, max_receive_size: usize) -> Self {
    Transport {
      stream,
      read_buf: Vec::with_capacity(max_receive_size.min(READ_CHUNK) + 1),
      max_receive_size,
    }
  }

  async fn read_more(&mut self) -> Result<(), ConnectionError> {
    let mut chunk = [0u8; READ_CHUNK];
    let n = self.stream.read(&mut chunk).await?;
    if n == 0 {
      return Err(ConnectionError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "peer closed the connection",
      )));
    }
    self.read_buf.extend_from_slice(&chunk[..n]);
    Ok(())
  }

  /// Reads and parses one HTTP Upgrade request, blocking (cooperatively)
  /// until the terminating `\r\n\r\n` has arrived.
  pub async fn read_handshake(&mut self, configured_service: &str) -> Result<Request, ConnectionError> {
    loop {
      if let Some(end) = find_header_terminator(&self.read_buf) {
        let text = std::str::from_utf8(&self.read_buf[..end])
          .map_err(|_| crate::error::HandshakeError::MalformedRequestLine)?;
        let request = handshake::parse_request(text, configured_service)?;
        self.read_buf.drain(..end + 4);
        return Ok(request);
      }

      if self.read_buf.len() > self.max_receive_size {
        return Err(crate::error::HandshakeError::MalformedRequestLine.into());
      }

      self.read_more().await?;
    }
  }

  /// Reads and parses one complete, unmasked-in-place frame.
  pub async fn read_frame(&mut self) -> Result<Frame, ConnectionError> {
    loop {
      match Header::parse(&self.read_buf)? {
        None => self.read_more().await?,
        Some(header) => {
          let frame_size = header.header_size + header.payload_len as usize;
          if header.payload_len > self.max_receive_size as u64 {
            return Err(
              FrameError::PayloadTooLarge {
                limit: self.max_receive_size,
                actual: header.payload_len,
              }
              .into(),
            );
          }
          if self.read_buf.len() < frame_size {
            self.read_more().await?;
            continue;
          }
          let frame = Frame::from_header(&header, &self.read_buf);
          self.read_buf.drain(..frame_size);
          return Ok(frame);
        }
      }
    }
  }

  /// Writes `bytes` to the stream in full, or returns the first I/O error.
  pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
    self.stream.write_all(bytes).await?;
    Ok(())
  }

  pub fn into_inner(self) -> S {
    self.stream
  }
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
  buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::duplex;

  #[tokio::test]
  async fn reads_handshake_split_across_several_writes() {
    let (mut client, server) = duplex(64);
    let mut transport = Transport::new(server, 4096);

    let request_bytes = b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\
      Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
      Sec-WebSocket-Version: 13\r\n\r\n";

    let write_task = tokio::spawn(async move {
      for chunk in request_bytes.chunks(7) {
        client.write_all(chunk).await.unwrap();
        tokio::task::yield_now().await;
      }
      client
    });

    let request = transport.read_handshake("chat").await.unwrap();
    assert_eq!(request.service, "chat");
    write_task.await.unwrap();
  }

  #[tokio::test]
  async fn reads_frame_split_across_several_writes() {
    let (mut client, server) = duplex(64);
    let mut transport = Transport::new(server, 4096);

    let mask = [1u8, 2, 3, 4];
    let mut payload = b"hello".to_vec();
    crate::mask::apply(&mut payload, mask);
    let mut bytes = vec![0x81, 0x85];
    bytes.extend_from_slice(&mask);
    bytes.extend_from_slice(&payload);

    let write_task = tokio::spawn(async move {
      for chunk in bytes.chunks(3) {
        client.write_all(chunk).await.unwrap();
        tokio::task::yield_now().await;
      }
    });

    let frame = transport.read_frame().await.unwrap();
    assert_eq!(frame.payload, b"hello");
    write_task.await.unwrap();
  }

  #[tokio::test]
  async fn oversize_frame_is_rejected() {
    let (mut client, server) = duplex(256);
    let mut transport = Transport::new(server, 8);

    let mask = [0u8; 4];
    let payload = vec![0u8; 16];
    let mut bytes = vec![0x81, 0x80 | 16];
    bytes.extend_from_slice(&mask);
    bytes.extend_from_slice(&payload);

    client.write_all(&bytes).await.unwrap();

    let err = transport.read_frame().await.unwrap_err();
    assert!(matches!(
      err,
      ConnectionError::Frame(FrameError::PayloadTooLarge { .. })
    ));
  }
}
