//! End-to-end tests driving a real [`Server`] over a loopback TCP socket,
//! speaking the wire protocol by hand on the client side (this crate has no
//! client API of its own).

use std::time::Duration;

use mooring::{Capabilities, CloseCode, ConnectionHandler, Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct Prefixer;

impl ConnectionHandler for Prefixer {
  fn on_message(&mut self, text: String, caps: &Capabilities) {
    caps.send(format!("I got: {text}"));
  }
}

async fn start_server() -> (Server, std::net::SocketAddr) {
  let mut config = ServerConfig::new(0, "chat", Box::new(|| Box::new(Prefixer)));
  config.max_receive_size = 1 << 17; // covers the 65536-byte boundary case
  let server = Server::bind(config).await.unwrap();
  let addr = server.local_addr().unwrap();
  (server, addr)
}

fn handshake_request(service: &str, addr: std::net::SocketAddr) -> String {
  format!(
    "GET /{service} HTTP/1.1\r\n\
     Host: {addr}\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
     Sec-WebSocket-Version: 13\r\n\r\n"
  )
}

async fn read_http_response(stream: &mut TcpStream) -> String {
  let mut buf = vec![0u8; 4096];
  let mut total = Vec::new();
  loop {
    let n = stream.read(&mut buf).await.unwrap();
    total.extend_from_slice(&buf[..n]);
    if total.windows(4).any(|w| w == b"\r\n\r\n") || n == 0 {
      break;
    }
  }
  String::from_utf8(total).unwrap()
}

fn masked_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
  let mask = [0x11, 0x22, 0x33, 0x44];
  let mut masked_payload = payload.to_vec();
  for (i, byte) in masked_payload.iter_mut().enumerate() {
    *byte ^= mask[i % 4];
  }

  let mut out = vec![(if fin { 0x80 } else { 0x00 }) | opcode];
  let len = payload.len();
  if len < 126 {
    out.push(0x80 | len as u8);
  } else if len <= u16::MAX as usize {
    out.push(0x80 | 126);
    out.extend_from_slice(&(len as u16).to_be_bytes());
  } else {
    out.push(0x80 | 127);
    out.extend_from_slice(&(len as u64).to_be_bytes());
  }
  out.extend_from_slice(&mask);
  out.extend_from_slice(&masked_payload);
  out
}

fn unmasked_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
  let mut out = vec![(if fin { 0x80 } else { 0x00 }) | opcode];
  let len = payload.len();
  if len < 126 {
    out.push(len as u8);
  } else if len <= u16::MAX as usize {
    out.push(126);
    out.extend_from_slice(&(len as u16).to_be_bytes());
  } else {
    out.push(127);
    out.extend_from_slice(&(len as u64).to_be_bytes());
  }
  out.extend_from_slice(payload);
  out
}

/// Reads exactly one server frame off `stream`: (opcode, fin, payload).
async fn read_frame(stream: &mut TcpStream) -> (u8, bool, Vec<u8>) {
  let mut head = [0u8; 2];
  stream.read_exact(&mut head).await.unwrap();
  let fin = head[0] & 0x80 != 0;
  let opcode = head[0] & 0x0F;
  let len7 = head[1] & 0x7F;
  assert_eq!(head[1] & 0x80, 0, "server frames must never be masked");

  let len = match len7 {
    126 => {
      let mut ext = [0u8; 2];
      stream.read_exact(&mut ext).await.unwrap();
      u16::from_be_bytes(ext) as usize
    }
    127 => {
      let mut ext = [0u8; 8];
      stream.read_exact(&mut ext).await.unwrap();
      u64::from_be_bytes(ext) as usize
    }
    small => small as usize,
  };

  let mut payload = vec![0u8; len];
  if len > 0 {
    stream.read_exact(&mut payload).await.unwrap();
  }
  (opcode, fin, payload)
}

#[tokio::test]
async fn handshake_succeeds_with_canonical_accept_key() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  let response = read_http_response(&mut client).await;

  assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
  assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
  assert!(response.contains("Upgrade: websocket\r\n"));
  assert!(response.contains("Connection: Upgrade\r\n"));
}

#[tokio::test]
async fn wrong_service_is_rejected() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("other", addr).as_bytes())
    .await
    .unwrap();
  let response = read_http_response(&mut client).await;

  assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn echoes_text_with_prefix() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  client
    .write_all(&masked_frame(true, 0x1, b"hello"))
    .await
    .unwrap();

  let (opcode, fin, payload) = read_frame(&mut client).await;
  assert_eq!(opcode, 0x1);
  assert!(fin);
  assert_eq!(payload, b"I got: hello");
}

#[tokio::test]
async fn fragmented_message_reassembles() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  client.write_all(&masked_frame(false, 0x1, b"he")).await.unwrap();
  client.write_all(&masked_frame(false, 0x0, b"ll")).await.unwrap();
  client.write_all(&masked_frame(true, 0x0, b"o")).await.unwrap();

  let (opcode, fin, payload) = read_frame(&mut client).await;
  assert_eq!(opcode, 0x1);
  assert!(fin);
  assert_eq!(payload, b"I got: hello");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  client.write_all(&masked_frame(true, 0x9, b"")).await.unwrap();

  let (opcode, fin, payload) = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut client))
    .await
    .unwrap();
  assert_eq!(opcode, 0xA);
  assert!(fin);
  assert!(payload.is_empty());
}

#[tokio::test]
async fn close_handshake_echoes_code_and_closes() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  let code = u16::from(CloseCode::Normal).to_be_bytes();
  client.write_all(&masked_frame(true, 0x8, &code)).await.unwrap();

  let (opcode, fin, payload) = read_frame(&mut client).await;
  assert_eq!(opcode, 0x8);
  assert!(fin);
  assert_eq!(payload, code);

  let mut trailing = [0u8; 1];
  let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut trailing))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(n, 0, "server should close the socket after the close handshake");
}

#[tokio::test]
async fn payload_lengths_at_encoding_boundaries_round_trip() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  for len in [125usize, 126, 65535, 65536] {
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
      .write_all(handshake_request("chat", addr).as_bytes())
      .await
      .unwrap();
    read_http_response(&mut client).await;

    let payload = vec![b'x'; len];
    client.write_all(&masked_frame(true, 0x1, &payload)).await.unwrap();

    let (opcode, fin, echoed) = read_frame(&mut client).await;
    assert_eq!(opcode, 0x1);
    assert!(fin);
    assert_eq!(echoed.len(), len + "I got: ".len());
    assert!(echoed.ends_with(&payload));
  }
}

#[tokio::test]
async fn oversize_payload_closes_with_message_too_big() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  let payload = vec![b'x'; 1 << 20];
  client.write_all(&masked_frame(true, 0x1, &payload)).await.unwrap();

  let (opcode, _fin, echoed) = read_frame(&mut client).await;
  assert_eq!(opcode, 0x8);
  assert_eq!(u16::from_be_bytes([echoed[0], echoed[1]]), 1009);
}

#[tokio::test]
async fn unmasked_client_frame_closes_with_protocol_error() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  client.write_all(&unmasked_frame(true, 0x1, b"hello")).await.unwrap();

  let (opcode, _fin, echoed) = read_frame(&mut client).await;
  assert_eq!(opcode, 0x8);
  assert_eq!(u16::from_be_bytes([echoed[0], echoed[1]]), 1002);
}

#[tokio::test]
async fn binary_frame_closes_with_unsupported_data() {
  let (server, addr) = start_server().await;
  tokio::spawn(server.run());

  let mut client = TcpStream::connect(addr).await.unwrap();
  client
    .write_all(handshake_request("chat", addr).as_bytes())
    .await
    .unwrap();
  read_http_response(&mut client).await;

  client.write_all(&masked_frame(true, 0x2, b"\x01\x02")).await.unwrap();

  let (opcode, _fin, echoed) = read_frame(&mut client).await;
  assert_eq!(opcode, 0x8);
  assert_eq!(u16::from_be_bytes([echoed[0], echoed[1]]), 1003);
}
