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

//! Error taxonomy for the frame codec, the handshake codec, and the
//! per-connection state machine.
//!
//! `Incomplete` ("not an error; retry") deliberately has no variant here.
//! Codec parsers return `Result<Option<T>, _>` instead, so the type system
//! forces callers to handle "need more bytes" separately from "this is
//! malformed".

use std::io;

use crate::close::CloseCode;

/// Errors from parsing or serializing a single frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
  #[error("reserved bits must be zero")]
  ReservedBitsSet,
  #[error("control frames must not be fragmented")]
  ControlFrameFragmented,
  #[error("control frame payload exceeds 125 bytes")]
  ControlFramePayloadTooLarge,
  #[error("client frame must be masked")]
  UnmaskedFrame,
  #[error("unsupported opcode {0}")]
  UnsupportedOpcode(u8),
  #[error("binary frames are not supported")]
  BinaryUnsupported,
  #[error("payload of {actual} bytes exceeds the {limit} byte limit")]
  PayloadTooLarge { limit: usize, actual: u64 },
  #[error(transparent)]
  Io(#[from] io::Error),
}

/// Errors from parsing an HTTP Upgrade request.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
  #[error("malformed request line")]
  MalformedRequestLine,
  #[error("HTTP version must be 1.1 or later")]
  UnsupportedHttpVersion,
  #[error("missing required header: {0}")]
  MissingHeader(&'static str),
  #[error("Upgrade header must be \"websocket\"")]
  UpgradeHeaderMismatch,
  #[error("Connection header must contain \"Upgrade\"")]
  ConnectionHeaderMismatch,
  #[error("Sec-WebSocket-Version must be 13")]
  VersionMismatch,
  #[error("requested service {requested:?} does not match configured service {configured:?}")]
  ServiceMismatch {
    requested: String,
    configured: String,
  },
}

/// Errors that terminate a connection, wide enough to cover both codec
/// failures and FSM-level violations (bad UTF-8, timeouts, explicit close).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
  #[error(transparent)]
  Frame(#[from] FrameError),
  #[error(transparent)]
  Handshake(#[from] HandshakeError),
  #[error("text message was not valid UTF-8")]
  Utf8,
  #[error("connection closed: {0:?}")]
  Closed(CloseCode),
  #[error("handshake did not complete within the configured timeout")]
  HandshakeTimeout,
  #[error("shutdown did not complete within the configured timeout")]
  ShutdownTimeout,
  #[error(transparent)]
  Io(#[from] io::Error),
}

impl ConnectionError {
  /// The close code this error should cause the FSM to send to the peer,
  /// if any. Peer-initiated closes and pure I/O failures have no code to
  /// send (the stream is already gone, or the peer supplied its own).
  pub fn close_code(&self) -> Option<CloseCode> {
    use ConnectionError::*;
    match self {
      Frame(FrameError::ReservedBitsSet)
      | Frame(FrameError::ControlFrameFragmented)
      | Frame(FrameError::ControlFramePayloadTooLarge)
      | Frame(FrameError::UnmaskedFrame) => Some(CloseCode::ProtocolError),
      Frame(FrameError::BinaryUnsupported) | Frame(FrameError::UnsupportedOpcode(_)) => {
        Some(CloseCode::UnsupportedDataType)
      }
      Frame(FrameError::PayloadTooLarge { .. }) => Some(CloseCode::MessageTooBig),
      Frame(FrameError::Io(_)) => None,
      Handshake(_) => None,
      Utf8 => Some(CloseCode::InconsistentData),
      Closed(_) | HandshakeTimeout | ShutdownTimeout | Io(_) => None,
    }
  }
}
