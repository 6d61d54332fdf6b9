//! Command table and middleware chain.
//!
//! A [`Registry`] is built by the caller at startup and shared with the
//! server. Lookups take a read lock, so concurrent dispatch never contends
//! with itself; registration takes the write lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{DispatchError, RegistryError};
use crate::handlers::Handler;
use crate::protocol::Command;

/// Wraps a handler to add behaviour around it.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

impl<F> Middleware for F
where
    F: Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync,
{
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self(next)
    }
}

#[derive(Default)]
struct Table {
    handlers: HashMap<Command, Arc<dyn Handler>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Maps command kinds to handlers and composes middleware around them.
#[derive(Default)]
pub struct Registry {
    table: RwLock<Table>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`, replacing any earlier registration.
    ///
    /// Only `get`, `put` and `close` are accepted; anything else is a
    /// configuration mistake reported as [`RegistryError::UnsupportedCommand`].
    pub fn register(
        &self,
        command: Command,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        if !command.is_supported() {
            return Err(RegistryError::UnsupportedCommand(command));
        }
        self.table.write().handlers.insert(command, handler);
        Ok(())
    }

    pub fn handle_get(&self, handler: Arc<dyn Handler>) {
        self.table.write().handlers.insert(Command::Get, handler);
    }

    pub fn handle_put(&self, handler: Arc<dyn Handler>) {
        self.table.write().handlers.insert(Command::Put, handler);
    }

    pub fn handle_close(&self, handler: Arc<dyn Handler>) {
        self.table.write().handlers.insert(Command::Close, handler);
    }

    /// Append middleware. The first one added is the outermost wrapper: it
    /// runs first on the way in and last on the way out.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.table.write().middleware.push(middleware);
    }

    /// The handler for `command` wrapped in the current middleware chain.
    pub fn dispatch(&self, command: &Command) -> Result<Arc<dyn Handler>, DispatchError> {
        let table = self.table.read();
        let handler = table
            .handlers
            .get(command)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownCommand(command.clone()))?;
        Ok(apply(handler, &table.middleware))
    }

    /// Kinds with a registered handler, in `get`, `put`, `close` order.
    pub fn known_commands(&self) -> Vec<Command> {
        let table = self.table.read();
        Command::SUPPORTED
            .into_iter()
            .filter(|command| table.handlers.contains_key(command))
            .collect()
    }
}

/// Wrap `handler` so that `middleware[0]` ends up outermost.
pub fn apply(handler: Arc<dyn Handler>, middleware: &[Arc<dyn Middleware>]) -> Arc<dyn Handler> {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, layer| layer.wrap(next))
}
