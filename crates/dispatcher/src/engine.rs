//! Execution engine abstraction
//!
//! The dispatcher never evaluates scripts or processes native debugger
//! commands itself. Both are delegated to an [`ExecutionEngine`], which is
//! also the only outbound path for commands the dispatcher sends, including
//! the follow-up request that delivers an async command's result.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use eyre::WrapErr;
use serde_json::Value;

use crate::Dispatcher;
use crate::error::DispatchError;

/// Trait for the engine hosting the debugged program
pub trait ExecutionEngine: Send + Sync {
    /// Submit a serialized request envelope for asynchronous processing
    ///
    /// The engine must eventually hand the message back to
    /// [`Dispatcher::process_debug_request`]. This call must not block on that
    /// processing.
    fn send_command(&self, message: &str) -> eyre::Result<()>;

    /// Synchronously run an injected script and return its value
    fn run_script(&self, script: &str) -> eyre::Result<Value>;

    /// Native processor for requests the dispatcher does not handle
    fn process_request(&self, _raw: &str) -> Option<String> {
        None
    }
}

type Evaluator = dyn Fn(&str) -> eyre::Result<Value> + Send + Sync;
type Fallback = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Channel backed execution engine
///
/// Commands are queued and processed when the queue is drained, either with
/// [`InMemoryEngine::pump`] or by a consumer of [`InMemoryEngine::commands`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dispatcher::{Dispatcher, InMemoryEngine};
///
/// let engine = Arc::new(InMemoryEngine::new());
/// let dispatcher = Dispatcher::new(engine.clone());
/// dispatcher.register_event("log");
/// dispatcher.send_command("log", None)?;
///
/// let messages = engine.pump(&dispatcher);
/// assert_eq!(messages.len(), 1);
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct InMemoryEngine {
    tx: Sender<String>,
    rx: Receiver<String>,
    evaluator: Option<Box<Evaluator>>,
    fallback: Option<Box<Fallback>>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            evaluator: None,
            fallback: None,
        }
    }

    /// Evaluate injected scripts with `evaluator`
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&str) -> eyre::Result<Value> + Send + Sync + 'static,
    {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    /// Answer requests the dispatcher does not handle with `fallback`
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Number of queued commands
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Receiver of queued commands, for consumers running their own loop
    pub fn commands(&self) -> Receiver<String> {
        self.rx.clone()
    }

    /// Wait up to `timeout` for the next queued command
    pub fn next_command(&self, timeout: Duration) -> Option<String> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Process queued commands until the queue is empty
    ///
    /// Commands queued while processing (e.g. by an async handler that
    /// completes immediately) are processed in the same call. Returns every
    /// message produced, in order.
    #[tracing::instrument(skip(self, dispatcher), level = "debug")]
    pub fn pump(&self, dispatcher: &Dispatcher) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            tracing::debug!(%command, "processing queued command");
            if let Some(message) = dispatcher.process_debug_request(&command) {
                messages.push(message);
            }
        }
        messages
    }
}

impl ExecutionEngine for InMemoryEngine {
    fn send_command(&self, message: &str) -> eyre::Result<()> {
        self.tx
            .send(message.to_string())
            .map_err(|_| DispatchError::EngineClosed)
            .wrap_err("queueing command")?;
        Ok(())
    }

    fn run_script(&self, script: &str) -> eyre::Result<Value> {
        match &self.evaluator {
            Some(evaluate) => evaluate(script).wrap_err("evaluating injected script"),
            None => Err(DispatchError::ScriptsUnsupported.into()),
        }
    }

    fn process_request(&self, raw: &str) -> Option<String> {
        self.fallback.as_ref().and_then(|fallback| fallback(raw))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn commands_are_queued_in_order() -> eyre::Result<()> {
        let engine = InMemoryEngine::new();
        engine.send_command("first")?;
        engine.send_command("second")?;

        assert_eq!(engine.pending(), 2);
        let commands = engine.commands();
        assert_eq!(commands.try_recv().ok().as_deref(), Some("first"));
        assert_eq!(
            engine.next_command(Duration::from_millis(10)).as_deref(),
            Some("second")
        );
        assert!(engine.next_command(Duration::from_millis(10)).is_none());
        Ok(())
    }

    #[test]
    fn scripts_without_evaluator() {
        let engine = InMemoryEngine::new();
        let err = engine.run_script("(1);").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::ScriptsUnsupported)
        ));
    }

    #[test]
    fn scripts_with_evaluator() -> eyre::Result<()> {
        let engine = InMemoryEngine::new().with_evaluator(|script| Ok(json!(script.len())));
        assert_eq!(engine.run_script("(42);")?, json!(5));
        Ok(())
    }

    #[test]
    fn fallback_processor() {
        let engine = InMemoryEngine::new();
        assert!(engine.process_request("{}").is_none());

        let engine = InMemoryEngine::new().with_fallback(|_| Some("native".to_string()));
        assert_eq!(engine.process_request("{}").as_deref(), Some("native"));
    }
}
