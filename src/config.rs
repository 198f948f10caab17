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

//! Server configuration. Plain struct, plain `Default`, the recognized
//! options and their defaults come straight from the external interface
//! this crate implements; there's no config-file format to parse since
//! nothing in this lineage pulls one in at a comparable scope.

use std::time::Duration;

use crate::handler::ConnectionHandler;

/// Produces one fresh [`ConnectionHandler`] per accepted connection.
pub type HandlerGenerator = Box<dyn Fn() -> Box<dyn ConnectionHandler> + Send + Sync>;

/// Tunables for a [`crate::Server`]. Construct with `ServerConfig::new`
/// (which requires the two fields with no sensible default) and override
/// fields directly; every timing/size field already carries the default
/// from the external interface.
pub struct ServerConfig {
  pub port: u16,
  pub service: String,
  pub generator: HandlerGenerator,

  pub shutdown_timeout: Duration,
  pub ping_interval: Duration,
  pub read_write_timeout: Duration,
  pub handshake_timeout: Duration,

  pub receive_buffer_size: usize,
  pub send_buffer_size: usize,
  pub max_receive_size: usize,

  /// Retained for interface fidelity with the original's `Thread.Sleep`-based
  /// accept loop; this server's accept loop is a `tokio::select!` arm woken
  /// by socket readiness instead, so this field has no busy-poll to drive.
  pub accept_poll_interval: Duration,
  /// Same as `accept_poll_interval`, but for the per-connection read loop.
  /// Floors the maintenance sweep's tick rate (see `sweep_period`) rather
  /// than driving a poll.
  pub data_poll_interval: Duration,
}

impl ServerConfig {
  pub fn new(port: u16, service: impl Into<String>, generator: HandlerGenerator) -> Self {
    ServerConfig {
      port,
      service: service.into(),
      generator,
      shutdown_timeout: Duration::from_secs(5),
      ping_interval: Duration::from_secs(10),
      read_write_timeout: Duration::from_secs(10),
      handshake_timeout: Duration::from_secs(10),
      receive_buffer_size: 2048,
      send_buffer_size: 16384,
      max_receive_size: 16384,
      accept_poll_interval: Duration::from_millis(100),
      data_poll_interval: Duration::from_millis(100),
    }
  }

  /// The maintenance sweep period: the largest interval that evenly
  /// divides both `handshake_timeout` and `ping_interval`, so neither
  /// deadline can be missed by more than one tick, floored by the
  /// configured poll granularity so the sweep never runs finer than it.
  pub(crate) fn sweep_period(&self) -> Duration {
    let a = self.handshake_timeout.as_millis().max(1) as u64;
    let b = self.ping_interval.as_millis().max(1) as u64;
    let gcd_period = Duration::from_millis(gcd(a, b));
    let floor = self.accept_poll_interval.min(self.data_poll_interval);
    gcd_period.max(floor)
  }
}

fn gcd(a: u64, b: u64) -> u64 {
  if b == 0 {
    a
  } else {
    gcd(b, a % b)
  }
}

/// The subset of [`ServerConfig`] each connection task needs, cloned out so
/// connections don't have to share the (non-`Clone`, due to the boxed
/// generator) `ServerConfig` itself.
#[derive(Clone)]
pub(crate) struct ConnectionParams {
  pub service: std::sync::Arc<str>,
  pub shutdown_timeout: Duration,
  pub ping_interval: Duration,
  pub read_write_timeout: Duration,
  pub handshake_timeout: Duration,
  pub max_receive_size: usize,
}

impl From<&ServerConfig> for ConnectionParams {
  fn from(config: &ServerConfig) -> Self {
    ConnectionParams {
      service: config.service.as_str().into(),
      shutdown_timeout: config.shutdown_timeout,
      ping_interval: config.ping_interval,
      read_write_timeout: config.read_write_timeout,
      handshake_timeout: config.handshake_timeout,
      max_receive_size: config.max_receive_size,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sweep_period_divides_both_timeouts() {
    let config = ServerConfig::new(0, "chat", Box::new(|| panic!("unused")));
    let period = config.sweep_period();
    assert_eq!(config.handshake_timeout.as_millis() % period.as_millis(), 0);
    assert_eq!(config.ping_interval.as_millis() % period.as_millis(), 0);
  }
}
