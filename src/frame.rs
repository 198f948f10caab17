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

//! The frame codec: pure functions over byte buffers with no I/O.
//!
//! Parsing is split into two phases so callers with a partially filled
//! buffer can tell "not enough bytes yet" apart from "this is malformed":
//! [`Header::parse`] reads just the header, and [`Frame::from_header`] slices
//! the payload out of a buffer that is now known to hold the whole frame.

use crate::error::FrameError;
use crate::mask::apply as apply_mask;

/// The six opcodes this crate knows about. RFC 6455 reserves 0x3-0x7 and
/// 0xB-0xF for future non-control and control frame types respectively;
/// those are rejected by [`Header::parse`] as [`FrameError::UnsupportedOpcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
  Continuation,
  Text,
  Binary,
  Close,
  Ping,
  Pong,
}

impl OpCode {
  pub fn is_control(self) -> bool {
    matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
  }

  fn to_byte(self) -> u8 {
    match self {
      OpCode::Continuation => 0x0,
      OpCode::Text => 0x1,
      OpCode::Binary => 0x2,
      OpCode::Close => 0x8,
      OpCode::Ping => 0x9,
      OpCode::Pong => 0xA,
    }
  }
}

impl TryFrom<u8> for OpCode {
  type Error = FrameError;

  fn try_from(byte: u8) -> Result<Self, Self::Error> {
    match byte {
      0x0 => Ok(OpCode::Continuation),
      0x1 => Ok(OpCode::Text),
      0x2 => Ok(OpCode::Binary),
      0x8 => Ok(OpCode::Close),
      0x9 => Ok(OpCode::Ping),
      0xA => Ok(OpCode::Pong),
      other => Err(FrameError::UnsupportedOpcode(other)),
    }
  }
}

/// A fully parsed frame header, and the number of leading bytes of the
/// input buffer it consumed.
#[derive(Debug, Clone, Copy)]
pub struct Header {
  pub fin: bool,
  pub opcode: OpCode,
  pub masked: bool,
  pub mask: Option<[u8; 4]>,
  pub payload_len: u64,
  pub header_size: usize,
}

impl Header {
  /// Attempts to parse a frame header from the front of `buf`.
  ///
  /// Returns `Ok(None)` if `buf` doesn't yet hold enough bytes to know the
  /// header's size (let alone parse it), the caller should read more and
  /// retry. Returns `Err` for a header that is structurally invalid
  /// regardless of how many more bytes arrive (reserved bits set, an
  /// unmasked client frame, a fragmented control frame, and so on).
  pub fn parse(buf: &[u8]) -> Result<Option<Header>, FrameError> {
    if buf.len() < 2 {
      return Ok(None);
    }

    let fin = buf[0] & 0b1000_0000 != 0;
    let rsv = buf[0] & 0b0111_0000;
    if rsv != 0 {
      return Err(FrameError::ReservedBitsSet);
    }
    let opcode = OpCode::try_from(buf[0] & 0b0000_1111)?;

    let masked = buf[1] & 0b1000_0000 != 0;
    let len7 = buf[1] & 0b0111_1111;

    let extra_len_bytes: usize = match len7 {
      126 => 2,
      127 => 8,
      _ => 0,
    };
    let header_size = 2 + extra_len_bytes + if masked { 4 } else { 0 };

    if buf.len() < 2 + extra_len_bytes {
      return Ok(None);
    }

    let payload_len: u64 = match len7 {
      126 => u16::from_be_bytes(buf[2..4].try_into().unwrap()) as u64,
      127 => u64::from_be_bytes(buf[2..10].try_into().unwrap()),
      small => small as u64,
    };

    if !masked {
      return Err(FrameError::UnmaskedFrame);
    }

    if opcode.is_control() {
      if !fin {
        return Err(FrameError::ControlFrameFragmented);
      }
      if payload_len > 125 {
        return Err(FrameError::ControlFramePayloadTooLarge);
      }
    }

    if buf.len() < header_size {
      return Ok(None);
    }

    let mask_offset = 2 + extra_len_bytes;
    let mask: [u8; 4] = buf[mask_offset..mask_offset + 4].try_into().unwrap();

    Ok(Some(Header {
      fin,
      opcode,
      masked,
      mask: Some(mask),
      payload_len,
      header_size,
    }))
  }
}

/// A complete frame: header plus unmasked payload.
#[derive(Debug, Clone)]
pub struct Frame {
  pub fin: bool,
  pub opcode: OpCode,
  pub payload: Vec<u8>,
}

impl Frame {
  /// Builds a `Frame` out of a parsed `header` and the bytes immediately
  /// following it in `buf` (`buf` must contain at least
  /// `header.header_size + header.payload_len` bytes). Unmasks the payload
  /// in place if the header said it was masked.
  pub fn from_header(header: &Header, buf: &[u8]) -> Frame {
    let start = header.header_size;
    let end = start + header.payload_len as usize;
    let mut payload = buf[start..end].to_vec();

    if let Some(mask) = header.mask {
      apply_mask(&mut payload, mask);
    }

    Frame {
      fin: header.fin,
      opcode: header.opcode,
      payload,
    }
  }

  /// A `fin=true` text frame.
  pub fn text(payload: Vec<u8>) -> Frame {
    Frame {
      fin: true,
      opcode: OpCode::Text,
      payload,
    }
  }

  /// A `fin=true` ping frame. Ping payloads must be at most 125 bytes.
  pub fn ping(payload: Vec<u8>) -> Frame {
    Frame {
      fin: true,
      opcode: OpCode::Ping,
      payload,
    }
  }

  /// A `fin=true` pong frame, echoing `payload` per RFC 6455 §5.5.3.
  pub fn pong(payload: Vec<u8>) -> Frame {
    Frame {
      fin: true,
      opcode: OpCode::Pong,
      payload,
    }
  }

  /// A close frame. `code` is omitted entirely (empty payload) when `None`.
  pub fn close(code: Option<crate::close::CloseCode>) -> Frame {
    let payload = match code {
      Some(code) if code.is_sendable() => u16::from(code).to_be_bytes().to_vec(),
      _ => Vec::new(),
    };
    Frame {
      fin: true,
      opcode: OpCode::Close,
      payload,
    }
  }

  /// Re-serializes a frame exactly as received, for echoing a peer's close
  /// frame back unmasked (the payload is already the close code bytes).
  pub fn close_raw(payload: Vec<u8>) -> Frame {
    Frame {
      fin: true,
      opcode: OpCode::Close,
      payload,
    }
  }

  /// Serializes this frame as a server-originated (unmasked) frame:
  /// big-endian extended length, no mask bit, no mask field.
  pub fn serialize(&self) -> Vec<u8> {
    let len = self.payload.len();
    let mut out = Vec::with_capacity(len + 10);

    let first_byte = 0b1000_0000 | self.opcode.to_byte();
    out.push(first_byte);

    if len < 126 {
      out.push(len as u8);
    } else if len <= u16::MAX as usize {
      out.push(126);
      out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
      out.push(127);
      out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(&self.payload);
    out
  }

  /// Whether `fin && (opcode == Text || opcode == Continuation)`.
  pub fn concludes_message(&self) -> bool {
    self.fin && matches!(self.opcode, OpCode::Text | OpCode::Continuation)
  }
}
