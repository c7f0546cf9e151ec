//! Inbound message handlers
//!
//! Every inbound message goes to the first handler whose topic prefix matches.
//! The two built-in handlers cover commands and desired-property updates; their
//! prefixes are disjoint so ordering only matters for handlers added later.

use super::EngineContext;
use crate::error::DeviceResult;
use crate::protocol::{last_segment, response_envelope, TopicSet};
use crate::transport::Transport;
use tracing::{debug, info};

/// A handler owns one topic prefix and processes messages published under it.
pub trait MessageHandler<T: Transport>: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Prefix of the topics this handler owns
    fn topic_prefix(&self) -> &str;

    fn is_responsible_for(&self, topic: &str) -> bool {
        topic.starts_with(self.topic_prefix())
    }

    /// Process one message. Errors are logged by the engine and never stop dispatch.
    fn handle(&mut self, ctx: &mut EngineContext<'_, T>, topic: &str, payload: &str)
        -> DeviceResult<()>;
}

/// Runs `commands/{name}` requests and publishes the wrapped result to `responses/{name}`.
pub struct CommandHandler {
    prefix: String,
}

impl CommandHandler {
    pub fn new(topics: &TopicSet) -> Self {
        Self {
            prefix: topics.commands().to_string(),
        }
    }
}

impl<T: Transport> MessageHandler<T> for CommandHandler {
    fn name(&self) -> &str {
        "command"
    }

    fn topic_prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(
        &mut self,
        ctx: &mut EngineContext<'_, T>,
        topic: &str,
        payload: &str,
    ) -> DeviceResult<()> {
        info!(%topic, %payload, "Received command");

        let command_name = last_segment(topic)?;
        let result = ctx.activate_command(command_name, payload);
        if result.is_empty() {
            debug!(command = command_name, "Command returned no result, no response sent");
            return Ok(());
        }

        ctx.publish_response(command_name, &response_envelope(&result))
    }
}

/// Stores `twin/desired/{name}` updates and notifies the application.
pub struct DesiredPropertyHandler {
    prefix: String,
}

impl DesiredPropertyHandler {
    pub fn new(topics: &TopicSet) -> Self {
        Self {
            prefix: topics.desired_properties().to_string(),
        }
    }
}

impl<T: Transport> MessageHandler<T> for DesiredPropertyHandler {
    fn name(&self) -> &str {
        "desired_property"
    }

    fn topic_prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(
        &mut self,
        ctx: &mut EngineContext<'_, T>,
        topic: &str,
        payload: &str,
    ) -> DeviceResult<()> {
        info!(%topic, %payload, "Received desired property update");

        let property_name = last_segment(topic)?;
        ctx.on_desired_property_update(property_name, payload);
        Ok(())
    }
}

/// Ordered handler collection; selection is first-match.
pub struct HandlerSet<T: Transport> {
    handlers: Vec<Box<dyn MessageHandler<T>>>,
}

impl<T: Transport> HandlerSet<T> {
    /// Command handler first, then desired-property handler.
    pub fn builtin(topics: &TopicSet) -> Self {
        Self {
            handlers: vec![
                Box::new(CommandHandler::new(topics)),
                Box::new(DesiredPropertyHandler::new(topics)),
            ],
        }
    }

    /// Append a handler after the existing ones
    pub fn push(&mut self, handler: Box<dyn MessageHandler<T>>) {
        self.handlers.push(handler);
    }

    /// First handler responsible for `topic`
    pub fn select(&mut self, topic: &str) -> Option<&mut (dyn MessageHandler<T> + 'static)> {
        self.handlers
            .iter_mut()
            .find(|handler| handler.is_responsible_for(topic))
            .map(|handler| handler.as_mut())
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
