//! Echoes every text message back to its sender on `ws://localhost:9001/chat`.
//!
//! ```
//! cargo run --example echo_server
//! ```

use anyhow::Result;
use mooring::{Capabilities, CloseCode, ConnectionHandler, Server, ServerConfig};

struct Echo {
  id: Option<mooring::ConnectionId>,
}

impl ConnectionHandler for Echo {
  fn on_connect(&mut self, caps: Capabilities) {
    self.id = Some(caps.id());
    tracing::info!(id = caps.id(), "connected");
  }

  fn on_message(&mut self, text: String, caps: &Capabilities) {
    caps.send(text);
  }

  fn on_close(&mut self, code: CloseCode) {
    tracing::info!(id = ?self.id, ?code, "closed");
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let config = ServerConfig::new(9001, "chat", Box::new(|| Box::new(Echo { id: None })));
  let server = Server::bind(config).await?;
  tracing::info!(addr = %server.local_addr()?, "listening");
  server.run().await?;
  Ok(())
}
