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

//! The HTTP/1.1 Upgrade handshake: no I/O, just text in, `Request`/bytes out.
//!
//! This deliberately doesn't reach for an HTTP parsing crate: the grammar
//! this server needs to understand is a handful of fixed headers on a
//! GET request, and the transport layer already guarantees it is handing
//! us a complete `\r\n\r\n`-terminated block.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::Engine as _;
use sha1::{Digest, Sha1};

use crate::error::HandshakeError;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// A parsed HTTP Upgrade request.
#[derive(Debug, Clone)]
pub struct Request {
  pub http_version: String,
  pub service: String,
  pub host: Option<String>,
  pub key: String,
  pub origin: Option<String>,
  pub protocols: Vec<String>,
  pub extensions: Vec<String>,
}

/// Parses the header block of an HTTP Upgrade request (everything up to
/// but not including the terminating `\r\n\r\n`).
///
/// `configured_service` is the last path segment this server is willing to
/// accept; a request for any other service is reported as
/// [`HandshakeError::ServiceMismatch`] so the caller can reply 400.
pub fn parse_request(text: &str, configured_service: &str) -> Result<Request, HandshakeError> {
  let normalized = text.replace("\r\n", "\n");
  let mut lines = normalized.lines();

  let request_line = lines.next().ok_or(HandshakeError::MalformedRequestLine)?;
  let mut parts = request_line.split_whitespace();
  let _method = parts.next().ok_or(HandshakeError::MalformedRequestLine)?;
  let request_uri = parts.next().ok_or(HandshakeError::MalformedRequestLine)?;
  let http_version_token = parts.next().ok_or(HandshakeError::MalformedRequestLine)?;

  let http_version = http_version_token
    .strip_prefix("HTTP/")
    .ok_or(HandshakeError::MalformedRequestLine)?;
  check_http_version(http_version)?;

  let service = last_path_segment(request_uri);

  let mut host = None;
  let mut key = None;
  let mut origin = None;
  let mut protocols = Vec::new();
  let mut extensions = Vec::new();
  let mut upgrade_ok = false;
  let mut connection_ok = false;
  let mut version_ok = false;

  for line in lines {
    let Some((name, value)) = split_header_line(line) else {
      continue;
    };

    match name.to_ascii_lowercase().as_str() {
      "host" => host = Some(value.to_string()),
      "upgrade" => upgrade_ok = value.eq_ignore_ascii_case("websocket"),
      "connection" => {
        connection_ok = value
          .split(',')
          .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
      }
      "sec-websocket-version" => version_ok = value == "13",
      "sec-websocket-key" => key = Some(value.to_string()),
      "origin" => origin = Some(value.to_string()),
      "sec-websocket-protocol" => {
        protocols = value.split(',').map(|s| s.trim().to_string()).collect()
      }
      "sec-websocket-extensions" => {
        extensions = value.split(',').map(|s| s.trim().to_string()).collect()
      }
      _ => {}
    }
  }

  if host.is_none() {
    return Err(HandshakeError::MissingHeader("Host"));
  }
  if !upgrade_ok {
    return Err(HandshakeError::UpgradeHeaderMismatch);
  }
  if !connection_ok {
    return Err(HandshakeError::ConnectionHeaderMismatch);
  }
  if !version_ok {
    return Err(HandshakeError::VersionMismatch);
  }
  let key = key.ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;

  if service != configured_service {
    return Err(HandshakeError::ServiceMismatch {
      requested: service,
      configured: configured_service.to_string(),
    });
  }

  Ok(Request {
    http_version: http_version.to_string(),
    service,
    host,
    key,
    origin,
    protocols,
    extensions,
  })
}

fn check_http_version(version: &str) -> Result<(), HandshakeError> {
  let (major, minor) = version
    .split_once('.')
    .ok_or(HandshakeError::UnsupportedHttpVersion)?;
  let major: u32 = major
    .parse()
    .map_err(|_| HandshakeError::UnsupportedHttpVersion)?;
  let minor: u32 = minor
    .parse()
    .map_err(|_| HandshakeError::UnsupportedHttpVersion)?;

  if (major, minor) < (1, 1) {
    return Err(HandshakeError::UnsupportedHttpVersion);
  }
  Ok(())
}

fn last_path_segment(request_uri: &str) -> String {
  let path = request_uri.split('?').next().unwrap_or(request_uri);
  path
    .split('/')
    .filter(|segment| !segment.is_empty())
    .next_back()
    .unwrap_or("")
    .to_string()
}

fn split_header_line(line: &str) -> Option<(&str, &str)> {
  let (name, value) = line.split_once(':')?;
  let name = name.trim();
  if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
    return None;
  }
  Some((name, value.trim()))
}

/// `base64(SHA1(client_key ++ WEBSOCKET_GUID))`, per RFC 6455 §1.3.
pub fn accept_key(client_key: &str) -> String {
  let mut hasher = Sha1::new();
  hasher.update(client_key.as_bytes());
  hasher.update(WEBSOCKET_GUID.as_bytes());
  BASE64.encode(hasher.finalize())
}

/// Builds the literal `101 Switching Protocols` response. Protocols and
/// extensions are never advertised back: this server doesn't negotiate them.
pub fn switching_protocols(request: &Request) -> Vec<u8> {
  format!(
    "HTTP/{} 101 Switching Protocols\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Accept: {}\r\n\r\n",
    request.http_version,
    accept_key(&request.key)
  )
  .into_bytes()
}

/// Builds a `400 Bad Request` response, used for both malformed requests
/// (where we may not have a known HTTP version yet) and a well-formed
/// request for the wrong service.
pub fn bad_request(http_version: &str) -> Vec<u8> {
  format!("HTTP/{http_version} 400 Bad Request\r\n\r\n").into_bytes()
}
