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

//! The per-connection state machine: `Startup -> Connected -> Closing -> Closed`.
//!
//! Each connection is driven by exactly one task, selecting between three
//! event sources: the heartbeat deadline, the next inbound frame, and the
//! next item on its own outbound queue. Keeping the write queue a
//! `tokio::sync::mpsc` channel drained by this same task, rather than a
//! `Mutex<VecDeque<_>>` popped by a writer elsewhere, makes "at most one
//! in-flight write" true by construction instead of by locking discipline.

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::close::CloseCode;
use crate::config::ConnectionParams;
use crate::error::ConnectionError;
use crate::frame::{Frame, OpCode};
use crate::handler::{Capabilities, ConnectionHandler};
use crate::handshake;
use crate::registry::{ConnectionId, Outbound, Registry};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Startup,
  Connected,
  Closing,
  Closed,
}

pub(crate) struct Connection<S> {
  id: ConnectionId,
  transport: Transport<S>,
  handler: Box<dyn ConnectionHandler>,
  caps: Capabilities,
  registry: Registry,
  outbound_rx: mpsc::UnboundedReceiver<Outbound>,
  params: ConnectionParams,
  state: State,
  fragment_buffer: Vec<u8>,
  last_activity: Instant,
  peer_close_code: Option<CloseCode>,
}

impl<S> Connection<S>
where
  S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
  /// `outbound_tx`/`outbound_rx` are created by the caller so the sender
  /// half can be registered in the registry (which assigns `id`) before
  /// this connection's task is spawned.
  pub(crate) fn new(
    id: ConnectionId,
    stream: S,
    handler: Box<dyn ConnectionHandler>,
    registry: Registry,
    params: ConnectionParams,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
  ) -> Self {
    let caps = Capabilities::new(id, outbound_tx, registry.clone());
    Connection {
      id,
      transport: Transport::new(stream, params.max_receive_size),
      handler,
      caps,
      registry,
      outbound_rx,
      params,
      state: State::Startup,
      fragment_buffer: Vec::new(),
      last_activity: Instant::now(),
      peer_close_code: None,
    }
  }

  pub(crate) async fn run(mut self) {
    if !self.drive_handshake().await {
      self.registry.deregister(self.id);
      return;
    }

    self.last_activity = Instant::now();
    self.handler.on_connect(self.caps.clone());

    while self.state == State::Connected {
      self.drive_connected().await;
    }

    if self.state == State::Closing {
      self.drain_on_shutdown().await;
    }

    self.handler.on_close(self.peer_close_code.unwrap_or(CloseCode::NoStatus));
    self.registry.deregister(self.id);
  }

  /// Returns `true` if the handshake completed and the connection is now
  /// `Connected`.
  async fn drive_handshake(&mut self) -> bool {
    let result = tokio::time::timeout(
      self.params.handshake_timeout,
      self.transport.read_handshake(&self.params.service),
    )
    .await;

    match result {
      Err(_) => {
        tracing::warn!(id = self.id, "handshake timed out");
        false
      }
      Ok(Err(ConnectionError::Handshake(_))) => {
        tracing::warn!(id = self.id, "rejecting malformed handshake");
        let _ = self.transport.write_raw(&handshake::bad_request("1.1")).await;
        false
      }
      Ok(Err(other)) => {
        tracing::warn!(id = self.id, error = %other, "handshake failed");
        false
      }
      Ok(Ok(request)) => {
        let response = handshake::switching_protocols(&request);
        if self.transport.write_raw(&response).await.is_err() {
          tracing::warn!(id = self.id, "failed to write handshake response");
          return false;
        }
        tracing::debug!(id = self.id, service = %request.service, "handshake complete");
        self.state = State::Connected;
        true
      }
    }
  }

  async fn drive_connected(&mut self) {
    let ping_deadline = self.last_activity + self.params.ping_interval;

    tokio::select! {
      _ = tokio::time::sleep_until(ping_deadline) => {
        if self.transport.write_raw(&Frame::pong(Vec::new()).serialize()).await.is_err() {
          self.state = State::Closed;
          return;
        }
        self.last_activity = Instant::now();
      }
      frame_result = tokio::time::timeout(self.params.read_write_timeout, self.transport.read_frame()) => {
        match frame_result {
          Err(_) => {
            tracing::warn!(id = self.id, "read timed out");
            self.state = State::Closed;
          }
          Ok(Err(err)) => self.fail(err).await,
          Ok(Ok(frame)) => self.handle_frame(frame).await,
        }
      }
      outbound = self.outbound_rx.recv() => {
        if let Some(Outbound::Frame(frame)) = outbound {
          self.write_outbound(frame).await;
        }
      }
    }
  }

  async fn write_outbound(&mut self, frame: Frame) {
    let is_close = frame.opcode == OpCode::Close;
    if self.transport.write_raw(&frame.serialize()).await.is_err() {
      self.state = State::Closed;
      return;
    }
    if is_close {
      self.state = State::Closing;
    }
  }

  async fn handle_frame(&mut self, frame: Frame) {
    match frame.opcode {
      OpCode::Text | OpCode::Continuation => self.handle_message_fragment(frame).await,
      OpCode::Ping => {
        if self
          .transport
          .write_raw(&Frame::pong(frame.payload).serialize())
          .await
          .is_err()
        {
          self.state = State::Closed;
        }
      }
      OpCode::Pong => self.last_activity = Instant::now(),
      OpCode::Close => self.handle_close(frame).await,
      OpCode::Binary => self.close_with(CloseCode::UnsupportedDataType).await,
    }
  }

  async fn handle_message_fragment(&mut self, frame: Frame) {
    if self.fragment_buffer.len() + frame.payload.len() > self.params.max_receive_size {
      self.close_with(CloseCode::MessageTooBig).await;
      return;
    }
    self.fragment_buffer.extend_from_slice(&frame.payload);

    if !frame.concludes_message() {
      return;
    }

    let bytes = std::mem::take(&mut self.fragment_buffer);
    match String::from_utf8(bytes) {
      Ok(text) => {
        // Scheduling boundary: on_message never runs inline with the buffer
        // mutation above, so a slow handler can't stall the next read.
        tokio::task::yield_now().await;
        self.handler.on_message(text, &self.caps);
      }
      Err(_) => self.close_with(CloseCode::InconsistentData).await,
    }
  }

  async fn handle_close(&mut self, frame: Frame) {
    let code = match frame.payload.len() {
      0 => None,
      1 => {
        self.close_with(CloseCode::ProtocolError).await;
        return;
      }
      _ => Some(CloseCode::from(u16::from_be_bytes([
        frame.payload[0],
        frame.payload[1],
      ]))),
    };
    self.peer_close_code = code;
    let echoed = Frame::close_raw(frame.payload);
    if self.transport.write_raw(&echoed.serialize()).await.is_err() {
      self.state = State::Closed;
      return;
    }
    self.state = State::Closing;
  }

  async fn fail(&mut self, err: ConnectionError) {
    tracing::warn!(id = self.id, error = %err, "terminating connection after error");
    match err.close_code() {
      Some(code) => self.close_with(code).await,
      None => self.state = State::Closed,
    }
  }

  async fn close_with(&mut self, code: CloseCode) {
    let _ = self
      .transport
      .write_raw(&Frame::close(Some(code)).serialize())
      .await;
    self.peer_close_code.get_or_insert(code);
    self.state = State::Closing;
  }

  /// Flushes whatever is already queued before tearing the connection down,
  /// bounded by `min(shutdown_timeout, read_write_timeout)`, not a wait
  /// for new traffic, since nothing will arrive once shutdown starts.
  async fn drain_on_shutdown(&mut self) {
    let deadline = Instant::now() + self.params.shutdown_timeout.min(self.params.read_write_timeout);
    loop {
      let frame = match self.outbound_rx.try_recv() {
        Ok(Outbound::Frame(frame)) => frame,
        Err(_) => break,
      };
      let write = self.transport.write_raw(&frame.serialize());
      if tokio::time::timeout_at(deadline, write).await.is_err() {
        tracing::warn!(id = self.id, "shutdown drain timed out");
        break;
      }
    }
    self.state = State::Closed;
  }
}
