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

//! The server-wide connection registry: a monotonic id allocator plus a map
//! from id to each connection's outbound channel, used for broadcast and
//! shutdown. Broadcasts take a snapshot of the map under the lock and then
//! send to each sender lock-free, per the concurrency model's "snapshot,
//! then iterate lock-free" rule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::frame::Frame;

pub type ConnectionId = u64;

/// One item placed on a connection's outbound channel.
#[derive(Debug)]
pub enum Outbound {
  Frame(Frame),
}

struct Inner {
  next_id: AtomicU64,
  connections: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>>,
}

/// A cheap, `Clone`-able handle onto the shared connection registry.
#[derive(Clone)]
pub struct Registry(Arc<Inner>);

impl Registry {
  pub fn new() -> Self {
    Registry(Arc::new(Inner {
      next_id: AtomicU64::new(1),
      connections: Mutex::new(HashMap::new()),
    }))
  }

  /// Allocates a fresh, process-lifetime-unique connection id and registers
  /// its outbound sender.
  pub fn register(&self, sender: mpsc::UnboundedSender<Outbound>) -> ConnectionId {
    let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
    self.0.connections.lock().unwrap().insert(id, sender);
    id
  }

  pub fn deregister(&self, id: ConnectionId) {
    self.0.connections.lock().unwrap().remove(&id);
  }

  /// Sends a text frame to every currently-registered connection.
  ///
  /// Connections that join after the snapshot is taken may or may not
  /// receive the message, per the "no cross-connection ordering" rule; a
  /// send to a connection whose task has already exited is silently
  /// dropped, since it is about to be deregistered by the maintenance
  /// sweep anyway.
  pub fn broadcast(&self, text: String) {
    let snapshot: Vec<_> = self.0.connections.lock().unwrap().values().cloned().collect();
    for sender in snapshot {
      let _ = sender.send(Outbound::Frame(Frame::text(text.clone().into_bytes())));
    }
  }

  /// A snapshot of currently-registered connection ids.
  pub fn connected_ids(&self) -> Vec<ConnectionId> {
    self.0.connections.lock().unwrap().keys().copied().collect()
  }

  pub fn len(&self) -> usize {
    self.0.connections.lock().unwrap().len()
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}
