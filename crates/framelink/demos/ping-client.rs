//! Sends a few pings to a framelink server and prints the round-trip time.
//!
//! Run with:
//!   cargo run --features cli -- serve 127.0.0.1 --port 7400
//!   cargo run --example ping-client

use std::sync::Arc;
use std::time::{Duration, Instant};

use framelink::message::{MessageTypeRegistry, Ping, Pong};
use framelink::net::{ClientConnection, ConnectionConfig, ConnectionEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MessageTypeRegistry::with_builtin());
    let (mut client, mut events) = ClientConnection::new(registry, ConnectionConfig::default());
    client.connect_to("127.0.0.1", 7400).await?;

    for sequence in 1..=3 {
        let started = Instant::now();
        client.send(&Ping {
            sequence,
            sent_at_ms: None,
        })?;

        let reply = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = events.recv().await {
                if let ConnectionEvent::MessageReceived(message) = event {
                    if let Some(pong) = message.downcast_ref::<Pong>() {
                        return Some(pong.sequence);
                    }
                }
            }
            None
        })
        .await?;

        match reply {
            Some(seq) => eprintln!("pong {seq} in {:?}", started.elapsed()),
            None => {
                eprintln!("connection closed");
                break;
            }
        }
    }

    client.close().await;
    Ok(())
}
