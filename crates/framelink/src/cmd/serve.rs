use std::sync::Arc;

use framelink_frame::FrameConfig;
use framelink_message::{
    Dispatcher, Goodbye, MessageType, MessageTypeRegistry, OwnerId, Ping, Pong, SessionId, Text,
};
use framelink_net::{Server, ServerConfig, ServerEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{net_error, CliResult, SUCCESS};
use crate::output::{print_event, EventRecord, OutputFormat};

const SERVE_OWNER: OwnerId = OwnerId(1);

/// What the serve loop does after a handler ran.
#[derive(Debug)]
enum Action {
    Reply(SessionId, Pong),
    Relay(Text),
    Close(SessionId),
}

/// Handler that prints the message and queues the action it implies.
fn handle<M, F>(
    dispatcher: &mut Dispatcher,
    format: OutputFormat,
    actions: &mpsc::UnboundedSender<Action>,
    respond: F,
) where
    M: MessageType,
    F: Fn(&M, Option<SessionId>) -> Option<Action> + Send + 'static,
{
    let actions = actions.clone();
    dispatcher.register::<M, _>(SERVE_OWNER, move |message: &M, session| {
        print_event(&EventRecord::message(session, message), format);
        if let Some(action) = respond(message, session) {
            let _ = actions.send(action);
        }
    });
}

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut frame = FrameConfig::default();
    if let Some(stall) = &args.stall_timeout {
        frame.partial_frame_timeout = Some(parse_duration(stall)?);
    }
    let config = ServerConfig::default()
        .with_frame_config(frame)
        .with_max_sessions(args.max_sessions);

    let (mut dispatcher, queue) = Dispatcher::new();
    let (actions_tx, mut actions) = mpsc::unbounded_channel();
    handle::<Ping, _>(&mut dispatcher, format, &actions_tx, |ping, session| {
        session.map(|id| Action::Reply(id, Pong::answer(ping)))
    });
    handle::<Pong, _>(&mut dispatcher, format, &actions_tx, |_, _| None);
    handle::<Text, _>(&mut dispatcher, format, &actions_tx, |text, _| {
        Some(Action::Relay(text.clone()))
    });
    handle::<Goodbye, _>(&mut dispatcher, format, &actions_tx, |_, session| {
        session.map(Action::Close)
    });

    let registry = Arc::new(MessageTypeRegistry::with_builtin());
    let (mut server, mut events) = Server::with_dispatch_queue(registry, config, queue);
    server
        .listen(&args.addr, args.port)
        .await
        .map_err(|err| net_error("listen failed", err))?;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut handled = 0usize;
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                info!("interrupted, shutting down");
                break;
            }
            Some(event) = events.recv() => print_event(&server_event_record(&event), format),
            true = dispatcher.dispatch_next() => {
                while let Ok(action) = actions.try_recv() {
                    perform(&server, action);
                }
                handled = handled.saturating_add(1);
                if args.count.is_some_and(|count| handled >= count) {
                    break;
                }
            }
        }
    }

    server.close().await;
    while let Ok(event) = events.try_recv() {
        print_event(&server_event_record(&event), format);
    }
    Ok(SUCCESS)
}

fn perform(server: &Server, action: Action) {
    let result = match &action {
        Action::Reply(session_id, pong) => server.send_to_client(*session_id, pong),
        Action::Relay(text) => server.send_to_all(text).map(|_| ()),
        Action::Close(session_id) => server.disconnect_client(*session_id),
    };
    if let Err(err) = result {
        warn!(?action, error = %err, "action failed");
    }
}

fn server_event_record(event: &ServerEvent) -> EventRecord {
    match event {
        ServerEvent::Listening { addr } => EventRecord::listening(*addr),
        ServerEvent::ListenError { code, description } => {
            EventRecord::error(None, *code, description)
        }
        ServerEvent::ClientConnected {
            session_id,
            peer_addr,
        } => EventRecord::connected(Some(*session_id), *peer_addr),
        ServerEvent::ClientDisconnected { session_id } => {
            EventRecord::disconnected(Some(*session_id))
        }
        ServerEvent::MessageReceived {
            session_id,
            message,
        } => EventRecord::message(Some(*session_id), message.as_ref()),
        ServerEvent::Error {
            session_id,
            code,
            description,
        } => EventRecord::error(*session_id, *code, description),
    }
}
