//! Chat relay: every Text from one client is sent to all connected clients.
//!
//! Run with:
//!   cargo run --example chat-server
//!
//! In other terminals:
//!   cargo run --features cli -- send 127.0.0.1 --port 7400 --text hello --wait

use std::sync::Arc;

use framelink::message::{Dispatcher, MessageTypeRegistry, OwnerId, Text};
use framelink::net::{Server, ServerConfig, ServerEvent};
use tokio::sync::mpsc;

const RELAY: OwnerId = OwnerId(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MessageTypeRegistry::with_builtin());

    let (mut dispatcher, queue) = Dispatcher::new();
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<Text>();
    dispatcher.register::<Text, _>(RELAY, move |text: &Text, session| {
        let origin = session.map_or_else(|| "-".to_string(), |s| s.to_string());
        eprintln!("{origin}: {} says {:?}", text.from, text.body);
        let _ = relay_tx.send(text.clone());
    });

    let (mut server, mut events) =
        Server::with_dispatch_queue(registry, ServerConfig::default(), queue);
    let addr = server.listen("127.0.0.1", 7400).await?;
    eprintln!("Listening on {addr}");

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            Some(event) = events.recv() => match event {
                ServerEvent::ClientConnected { session_id, peer_addr } => {
                    eprintln!("{session_id} joined from {peer_addr}");
                }
                ServerEvent::ClientDisconnected { session_id } => {
                    eprintln!("{session_id} left");
                }
                _ => {}
            },
            true = dispatcher.dispatch_next() => {
                while let Ok(text) = relay_rx.try_recv() {
                    let reached = server.send_to_all(&text)?;
                    eprintln!("relayed to {reached} clients");
                }
            }
            _ = &mut interrupt => break,
        }
    }

    server.close().await;
    Ok(())
}
