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

//! The listener: accepts connections, spawns one task per connection, and
//! drains them cooperatively on shutdown.
//!
//! `Server::run` is a single `tokio::select!` loop: accept, maintenance
//! tick, and spawned-task reaping all live in the same future, so there is
//! exactly one place that owns the `JoinSet` and the shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::{ConnectionParams, ServerConfig};
use crate::connection::Connection;
use crate::registry::{ConnectionId, Registry};

/// A bound, not-yet-running WebSocket server.
pub struct Server {
  listener: TcpListener,
  config: Arc<ServerConfig>,
  registry: Registry,
  shutdown_tx: watch::Sender<bool>,
  shutdown_rx: watch::Receiver<bool>,
}

impl Server {
  /// Binds `0.0.0.0:{config.port}`. Does not accept connections until
  /// [`Server::run`] is polled.
  pub async fn bind(config: ServerConfig) -> std::io::Result<Server> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    Ok(Server {
      listener,
      config: Arc::new(config),
      registry: Registry::new(),
      shutdown_tx,
      shutdown_rx,
    })
  }

  pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
    self.listener.local_addr()
  }

  /// A cheap, `Clone`-able handle that outlives `run`'s future, for
  /// broadcasting and triggering shutdown from outside the accept loop.
  pub fn handle(&self) -> ServerHandle {
    ServerHandle {
      registry: self.registry.clone(),
      shutdown_tx: self.shutdown_tx.clone(),
    }
  }

  /// Runs the accept loop until [`ServerHandle::shutdown`] is called, then
  /// drains in-flight connections for up to `config.shutdown_timeout`.
  ///
  /// `shutdown` itself only signals the accept loop to stop; whether the
  /// drain actually completed in time is reported by this future's result,
  /// so a caller awaits `run` after calling `shutdown` to learn the
  /// outcome, the same way it learns `bind` succeeded by awaiting `bind`.
  pub async fn run(mut self) -> std::io::Result<()> {
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut sweep = tokio::time::interval(self.config.sweep_period());
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        accepted = self.listener.accept() => {
          match accepted {
            Ok((stream, peer_addr)) => self.spawn_connection(stream, peer_addr, &mut tasks),
            Err(err) => tracing::warn!(error = %err, "accept failed"),
          }
        }
        _ = sweep.tick() => {
          tracing::debug!(connected = self.registry.len(), "maintenance sweep");
        }
        Some(outcome) = tasks.join_next(), if !tasks.is_empty() => {
          if let Err(err) = outcome {
            if err.is_panic() {
              tracing::error!("a connection task panicked");
            }
          }
        }
        changed = self.shutdown_rx.changed() => {
          if changed.is_err() || *self.shutdown_rx.borrow() {
            break;
          }
        }
      }
    }

    tracing::info!(connected = self.registry.len(), "shutting down, draining connections");
    let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
      while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
      tracing::warn!("shutdown timed out with connections still open");
      return Err(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "shutdown did not drain all connections within shutdown_timeout",
      ));
    }
    Ok(())
  }

  fn spawn_connection(&self, stream: TcpStream, peer_addr: SocketAddr, tasks: &mut JoinSet<()>) {
    if let Err(err) = stream.set_nodelay(true) {
      tracing::debug!(error = %err, "failed to set TCP_NODELAY");
    }
    // `receive_buffer_size`/`send_buffer_size` are accepted and stored on
    // `ServerConfig` for interface fidelity but aren't applied as raw socket
    // options here: doing so needs a platform socket-options crate this
    // lineage never pulls in, and `max_receive_size` already bounds memory
    // use at the application layer.

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let id: ConnectionId = self.registry.register(outbound_tx.clone());
    let handler = (self.config.generator)();
    let params = ConnectionParams::from(self.config.as_ref());

    let connection = Connection::new(
      id,
      stream,
      handler,
      self.registry.clone(),
      params,
      outbound_tx,
      outbound_rx,
    );

    let span = tracing::info_span!("connection", id, %peer_addr);
    tasks.spawn(connection.run().instrument(span));
  }
}

/// A handle onto a running (or not-yet-started) [`Server`], cheap to clone
/// and hand to application code that needs to broadcast or trigger shutdown
/// from outside the accept loop itself.
#[derive(Clone)]
pub struct ServerHandle {
  registry: Registry,
  shutdown_tx: watch::Sender<bool>,
}

impl ServerHandle {
  /// Enqueues a text frame on every currently-registered connection.
  pub fn broadcast(&self, text: impl Into<String>) {
    self.registry.broadcast(text.into());
  }

  /// A snapshot of currently-registered connection ids.
  pub fn connected_ids(&self) -> Vec<ConnectionId> {
    self.registry.connected_ids()
  }

  pub fn connected_count(&self) -> usize {
    self.registry.len()
  }

  /// Signals the accept loop to stop and begin draining. Idempotent.
  ///
  /// This only requests the stop; it doesn't wait for the drain to finish
  /// and can't report whether it stayed within `shutdown_timeout`. Await
  /// the corresponding [`Server::run`] future for that: it resolves to
  /// `Ok(())` iff every connection drained in time.
  pub fn shutdown(&self) {
    let _ = self.shutdown_tx.send(true);
  }
}
