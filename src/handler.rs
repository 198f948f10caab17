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

//! The narrow capability surface a connection hands to application code,
//! and the trait application code implements to receive events.
//!
//! Grounded in this lineage's own `WebSocketUpgrade::upgrade(handler)`
//! callback pattern: the application gets a handle it can call back into,
//! rather than being handed mutable access to connection internals.

use tokio::sync::mpsc;

use crate::close::CloseCode;
use crate::frame::Frame;
use crate::registry::{ConnectionId, Outbound, Registry};

/// What a connection implementor can do to its own connection and to the
/// server as a whole. Cheap to clone: it's two handles, not a buffer.
#[derive(Clone)]
pub struct Capabilities {
  id: ConnectionId,
  outbound: mpsc::UnboundedSender<Outbound>,
  registry: Registry,
}

impl Capabilities {
  pub(crate) fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<Outbound>, registry: Registry) -> Self {
    Capabilities {
      id,
      outbound,
      registry,
    }
  }

  /// This connection's server-assigned id.
  pub fn id(&self) -> ConnectionId {
    self.id
  }

  /// Enqueues a text frame on this connection's own write queue.
  pub fn send(&self, text: impl Into<String>) {
    let _ = self
      .outbound
      .send(Outbound::Frame(Frame::text(text.into().into_bytes())));
  }

  /// Enqueues a text frame on every connection the server currently knows
  /// about, including this one.
  pub fn broadcast(&self, text: impl Into<String>) {
    self.registry.broadcast(text.into());
  }

  /// Enqueues a Close frame on this connection and requests it move to
  /// `Closing`. Idempotent: calling it more than once just enqueues more
  /// close frames, which the peer will ignore after its first Close reply.
  pub fn close_self(&self) {
    let _ = self
      .outbound
      .send(Outbound::Frame(Frame::close(Some(CloseCode::Normal))));
  }
}

/// Application logic for one connection. A fresh instance is produced per
/// accepted connection by the `generator` given to [`crate::ServerConfig`].
///
/// All methods have a no-op default so implementors only override what
/// they need, most handlers care only about `on_message`.
pub trait ConnectionHandler: Send + 'static {
  /// Called once the handshake completes and the connection is `Connected`.
  fn on_connect(&mut self, _caps: Capabilities) {}

  /// Called once per complete, UTF-8-validated text message.
  fn on_message(&mut self, _text: String, _caps: &Capabilities) {}

  /// Called once the connection has moved to `Closing`, with the peer's
  /// close code if one was supplied.
  fn on_close(&mut self, _code: CloseCode) {}
}
