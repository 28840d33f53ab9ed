use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use framelink_message::{Message, MessageTypeRegistry, Ping, Text};
use framelink_net::{ClientConnection, ConnectionConfig, ConnectionEvent};
use tokio::sync::mpsc;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{net_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_event, EventRecord, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let config = ConnectionConfig::default().with_connect_timeout(Some(connect_timeout));

    let registry = Arc::new(MessageTypeRegistry::with_builtin());
    let (mut client, mut events) = ClientConnection::new(registry, config);
    client
        .connect_to(&args.host, args.port)
        .await
        .map_err(|err| net_error("connect failed", err))?;

    let message = build_message(&args);
    client
        .send(message.as_ref())
        .map_err(|err| net_error("send failed", err))?;

    let outcome = if args.wait {
        wait_for_message(&mut events, wait_timeout)
            .await
            .map(|reply| print_event(&EventRecord::message(None, reply.as_ref()), format))
    } else {
        Ok(())
    };

    client.close().await;
    outcome.map(|()| SUCCESS)
}

fn build_message(args: &SendArgs) -> Box<dyn Message> {
    match &args.text {
        Some(body) => Box::new(Text::new(args.from.clone(), body.clone())),
        None => Box::new(Ping {
            sequence: 1,
            sent_at_ms: now_millis(),
        }),
    }
}

fn now_millis() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| u64::try_from(elapsed.as_millis()).ok())
}

/// Wait for the first received message, skipping other events.
async fn wait_for_message(
    events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    timeout: Duration,
) -> CliResult<Box<dyn Message>> {
    let wait = async {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::MessageReceived(message) => return Ok(message),
                ConnectionEvent::Disconnected => {
                    return Err(CliError::new(
                        FAILURE,
                        "connection closed before a reply arrived",
                    ));
                }
                ConnectionEvent::Error { code, description } => {
                    tracing::warn!(code, %description, "connection error while waiting");
                }
                ConnectionEvent::Connected { .. } => {}
            }
        }
        Err(CliError::new(FAILURE, "event stream ended"))
    };

    tokio::time::timeout(timeout, wait).await.map_err(|_| {
        CliError::new(
            TIMEOUT,
            format!("no reply within {}ms", timeout.as_millis()),
        )
    })?
}
