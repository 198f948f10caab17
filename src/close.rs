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

//! WebSocket close codes (RFC 6455 §7.4), plus the two internal sentinels
//! this crate uses to represent "no code was given" and "the code given
//! wasn't recognized" without resorting to `Option<CloseCode>` everywhere.

/// The 16-bit status code carried in the first two bytes of a Close frame's
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CloseCode {
  Normal,
  GoingAway,
  ProtocolError,
  UnsupportedDataType,
  InconsistentData,
  PolicyViolation,
  MessageTooBig,
  ExpectedExtension,
  UnexpectedError,
  /// Internal sentinel: the close frame carried no payload at all.
  NoStatus,
  /// Internal sentinel: the code in the payload isn't one we recognize.
  BadStatus(u16),
  /// Any other code already defined by RFC 6455 or an extension that this
  /// crate doesn't give a named variant to.
  Other(u16),
}

impl CloseCode {
  /// Whether this code may legally appear on the wire in a frame this
  /// crate sends or accepts as a peer-supplied code. `NoStatus` is
  /// reserved for the absence of a code and must never be serialized.
  pub fn is_sendable(self) -> bool {
    !matches!(self, CloseCode::NoStatus)
  }
}

impl From<u16> for CloseCode {
  fn from(code: u16) -> Self {
    use CloseCode::*;
    match code {
      1000 => Normal,
      1001 => GoingAway,
      1002 => ProtocolError,
      1003 => UnsupportedDataType,
      1007 => InconsistentData,
      1008 => PolicyViolation,
      1009 => MessageTooBig,
      1010 => ExpectedExtension,
      1011 => UnexpectedError,
      4000 => NoStatus,
      4001 => BadStatus(code),
      other => Other(other),
    }
  }
}

impl From<CloseCode> for u16 {
  fn from(code: CloseCode) -> u16 {
    use CloseCode::*;
    match code {
      Normal => 1000,
      GoingAway => 1001,
      ProtocolError => 1002,
      UnsupportedDataType => 1003,
      InconsistentData => 1007,
      PolicyViolation => 1008,
      MessageTooBig => 1009,
      ExpectedExtension => 1010,
      UnexpectedError => 1011,
      NoStatus => 4000,
      BadStatus(code) => code,
      Other(code) => code,
    }
  }
}
