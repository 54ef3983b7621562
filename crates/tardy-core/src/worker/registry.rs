use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::message::Message;
use crate::queue::Ack;

/// Processes one kind of message.
///
/// The handler owns the [`Ack`] it receives: it acks once the work is done,
/// or drops it to let the queue redeliver the message after the ack timeout.
/// Handlers run on execution pool threads, never on the poll thread.
pub trait MessageHandler<M: Message>: Send + Sync + 'static {
    /// The [`Message::kind`] this handler accepts.
    fn message_kind(&self) -> &'static str;

    fn handle(&self, message: M, ack: Ack);
}

/// Maps message kinds to their handler. The first handler registered for a
/// kind wins; later ones are ignored with a warning.
pub struct HandlerRegistry<M: Message> {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler<M>>>,
}

impl<M: Message> Default for HandlerRegistry<M> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<M: Message> HandlerRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. Returns `false` if its kind was already taken.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler<M>>) -> bool {
        let kind = handler.message_kind();
        if self.handlers.contains_key(kind) {
            warn!(kind, "handler already registered for message kind, ignoring");
            return false;
        }
        self.handlers.insert(kind, handler);
        true
    }

    pub fn with(mut self, handler: impl MessageHandler<M>) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn MessageHandler<M>>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
