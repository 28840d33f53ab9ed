//! Deferred, exact-kind message dispatch.
//!
//! Connections push decoded messages into a [`DispatchQueue`]. The owning
//! [`Dispatcher`] drains it on its own task and calls the handlers registered
//! for the message's concrete kind, in registration order. Handlers for other
//! kinds are never called, even if a message would downcast to them.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use crate::message::{Message, MessageKind, MessageType};

/// Server-assigned identifier of a connected client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identity of a handler owner. One owner holds at most one handler per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u64);

/// A queued message and the session it arrived on, if any.
#[derive(Debug)]
pub struct Envelope {
    pub message: Box<dyn Message>,
    pub session: Option<SessionId>,
}

/// Cloneable producer handle of a dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl DispatchQueue {
    /// Queue a message with no originating session.
    ///
    /// Returns false if the dispatcher has been dropped.
    pub fn enqueue(&self, message: Box<dyn Message>) -> bool {
        self.send(Envelope {
            message,
            session: None,
        })
    }

    /// Queue a message received on `session`.
    pub fn enqueue_from(&self, session: SessionId, message: Box<dyn Message>) -> bool {
        self.send(Envelope {
            message,
            session: Some(session),
        })
    }

    fn send(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }

    /// True once the dispatcher is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

type Callback = Box<dyn FnMut(&dyn Message, Option<SessionId>) + Send>;

struct HandlerEntry {
    owner: OwnerId,
    callback: Callback,
}

/// Per-kind handler lists.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageKind, Vec<HandlerEntry>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, entries) in &self.handlers {
            map.entry(kind, &entries.len());
        }
        map.finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for kind `M` on behalf of `owner`.
    ///
    /// If the owner already has a handler for `M`, it is replaced in place
    /// and keeps its position in the call order.
    pub fn register<M, F>(&mut self, owner: OwnerId, mut callback: F)
    where
        M: MessageType,
        F: FnMut(&M, Option<SessionId>) + Send + 'static,
    {
        let callback: Callback = Box::new(move |message: &dyn Message, session: Option<SessionId>| {
            if let Some(message) = message.downcast_ref::<M>() {
                callback(message, session);
            }
        });

        let entries = self.handlers.entry(M::KIND).or_default();
        match entries.iter_mut().find(|entry| entry.owner == owner) {
            Some(entry) => entry.callback = callback,
            None => entries.push(HandlerEntry { owner, callback }),
        }
    }

    /// Drop every handler held by `owner`. Returns how many were removed.
    pub fn unregister_owner(&mut self, owner: OwnerId) -> usize {
        let mut removed = 0;
        self.handlers.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| entry.owner != owner);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: MessageKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Call every handler for the envelope's kind. Returns how many ran.
    pub fn invoke(&mut self, envelope: &Envelope) -> usize {
        let Some(entries) = self.handlers.get_mut(&envelope.message.kind()) else {
            return 0;
        };
        for entry in entries.iter_mut() {
            (entry.callback)(envelope.message.as_ref(), envelope.session);
        }
        entries.len()
    }
}

/// Consumer side of a dispatch queue together with its handlers.
#[derive(Debug)]
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Envelope>,
    handlers: HandlerRegistry,
}

impl Dispatcher {
    /// Create a dispatcher and the queue handle that feeds it.
    pub fn new() -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            rx,
            handlers: HandlerRegistry::new(),
        };
        (dispatcher, DispatchQueue { tx })
    }

    /// See [`HandlerRegistry::register`].
    pub fn register<M, F>(&mut self, owner: OwnerId, callback: F)
    where
        M: MessageType,
        F: FnMut(&M, Option<SessionId>) + Send + 'static,
    {
        self.handlers.register::<M, F>(owner, callback);
    }

    /// See [`HandlerRegistry::unregister_owner`].
    pub fn unregister_owner(&mut self, owner: OwnerId) -> usize {
        self.handlers.unregister_owner(owner)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Deliver one queued message. Returns false if the queue was empty.
    pub fn dispatch(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(envelope) => {
                self.deliver(envelope);
                true
            }
            Err(_) => false,
        }
    }

    /// Deliver every message queued so far. Returns how many were delivered.
    pub fn dispatch_all(&mut self) -> usize {
        let mut delivered = 0;
        while self.dispatch() {
            delivered += 1;
        }
        delivered
    }

    /// Deliver messages as they arrive until every queue handle is dropped.
    pub async fn run(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(envelope) = self.rx.recv().await {
            self.deliver(envelope);
            delivered += 1;
        }
        delivered
    }

    /// Wait for the next message and deliver it. Returns false once every
    /// queue handle is dropped and the queue is empty.
    pub async fn dispatch_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(envelope) => {
                self.deliver(envelope);
                true
            }
            None => false,
        }
    }

    fn deliver(&mut self, envelope: Envelope) {
        let invoked = self.handlers.invoke(&envelope);
        if invoked == 0 {
            trace!(kind = %envelope.message.kind(), "no handler for message");
        }
    }
}
