//! Message type to handler routing table.
//!
//! Protocol extensions populate a [`HandlerRegistry`] at startup through their
//! own `register` hooks. Once the daemon starts serving, the registry is
//! shared read-only behind an `Arc`; changing it means building a new one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{HandlerError, RegistryError};
use crate::message::{Message, MessageType};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// A transaction handler answering one or more message types.
///
/// Implementations must be shareable across connection threads.
pub trait TransactionHandler: Send + Sync {
    /// Name used in logs and registrations.
    fn name(&self) -> &str;

    /// Module or extension providing the handler.
    fn module(&self) -> &str;

    /// Whether the handler serves `message_type`.
    fn accepts(&self, message_type: &MessageType) -> bool;

    /// Produces the encoded reply to `message`.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when no reply can be produced. The
    /// dispatcher answers it with a generic application error.
    fn reply(&self, message: &Message) -> Result<String, HandlerError>;
}

/// One row of the routing table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandlerRegistration {
    /// Message type key, for example `QBP^Q22^QBP_Q21`.
    pub message_type: MessageType,
    /// Module providing the handler.
    pub handler_module: String,
    /// Handler name.
    pub handler_name: String,
}

/// Routing table from message type to handler. At most one handler per type;
/// the last registration wins.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Arc<dyn TransactionHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandlerRegistry")
            .field("registrations", &self.registrations())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `message_type` to `handler`, returning the registration it
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyMessageType`] for a blank key and
    /// [`RegistryError::IncompatibleHandler`] when the handler does not
    /// accept the type.
    pub fn register(
        &mut self,
        message_type: impl Into<MessageType>,
        handler: Arc<dyn TransactionHandler>,
    ) -> Result<Option<HandlerRegistration>, RegistryError> {
        let key = message_type.into();
        if key.is_empty() {
            return Err(RegistryError::EmptyMessageType);
        }
        if !handler.accepts(&key) {
            return Err(RegistryError::IncompatibleHandler {
                handler: handler.name().to_owned(),
                message_type: key.to_string(),
            });
        }
        debug!(
            target: REGISTRY_TARGET,
            message_type = %key,
            handler = handler.name(),
            module = handler.module(),
            "registering transaction handler"
        );
        let previous = self
            .handlers
            .insert(key.clone(), handler)
            .map(|replaced| registration(&key, replaced.as_ref()));
        if let Some(replaced) = &previous {
            warn!(
                target: REGISTRY_TARGET,
                message_type = %key,
                replaced = %replaced.handler_name,
                "replaced existing transaction handler"
            );
        }
        Ok(previous)
    }

    /// Handler registered for `message_type`, if any.
    #[must_use]
    pub fn lookup(&self, message_type: &str) -> Option<Arc<dyn TransactionHandler>> {
        self.handlers.get(&MessageType::new(message_type)).cloned()
    }

    /// Whether a handler is registered for `message_type`.
    #[must_use]
    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(&MessageType::new(message_type))
    }

    /// Number of registered message types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All registrations ordered by message type.
    #[must_use]
    pub fn registrations(&self) -> Vec<HandlerRegistration> {
        let mut rows: Vec<HandlerRegistration> = self
            .handlers
            .iter()
            .map(|(message_type, handler)| registration(message_type, handler.as_ref()))
            .collect();
        rows.sort();
        rows
    }
}

fn registration(message_type: &MessageType, handler: &dyn TransactionHandler) -> HandlerRegistration {
    HandlerRegistration {
        message_type: message_type.clone(),
        handler_module: handler.module().to_owned(),
        handler_name: handler.name().to_owned(),
    }
}
