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

//! _mooring_ is a minimal RFC 6455 WebSocket server.
//!
//! It owns the accept loop, the handshake, the frame codec, and the
//! per-connection state machine; application code only ever sees a
//! [`ConnectionHandler`] and the narrow [`Capabilities`] it's handed.
//!
//! # Example
//!
//! ```no_run
//! use mooring::{Capabilities, ConnectionHandler, Server, ServerConfig};
//!
//! struct Echo;
//!
//! impl ConnectionHandler for Echo {
//!   fn on_message(&mut self, text: String, caps: &Capabilities) {
//!     caps.send(text);
//!   }
//! }
//!
//! # async fn run() -> std::io::Result<()> {
//! let config = ServerConfig::new(9001, "chat", Box::new(|| Box::new(Echo)));
//! let server = Server::bind(config).await?;
//! server.run().await
//! # }
//! ```
//!
//! _permessage-deflate and binary messages are not supported; see the
//! crate's design notes for why._

mod close;
mod config;
mod connection;
mod error;
mod frame;
mod handler;
mod handshake;
mod mask;
mod registry;
mod server;
mod transport;

pub use close::CloseCode;
pub use config::{HandlerGenerator, ServerConfig};
pub use error::{ConnectionError, FrameError, HandshakeError};
pub use frame::{Frame, OpCode};
pub use handler::{Capabilities, ConnectionHandler};
pub use registry::ConnectionId;
pub use server::{Server, ServerHandle};
