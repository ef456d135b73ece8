//! Command handlers and async completion
use std::fmt;
use std::sync::Arc;

use eyre::WrapErr;
use serde_json::{Map, Value};

use crate::engine::ExecutionEngine;
use crate::request::{ASYNC_RESPONSE, Request};
use crate::response::{InternalError, Response};

pub type SyncHandler = dyn Fn(&Request, &mut Response) -> eyre::Result<()> + Send + Sync;
pub type AsyncHandler = dyn Fn(&Request, Response, Completion) -> eyre::Result<()> + Send + Sync;

/// A registered command handler
///
/// Synchronous handlers mutate the response in place. Asynchronous handlers
/// take ownership of the response and hand it back through their
/// [`Completion`] whenever the work finishes.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncHandler>),
    Async(Arc<AsyncHandler>),
}

impl Handler {
    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Sync(_) => "sync",
            Handler::Async(_) => "async",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}

/// Completion callback handed to asynchronous handlers
///
/// Resolving the completion sends a new request for the same command through
/// the execution engine, carrying the finished response as its
/// `asyncResponse` argument. The dispatcher answers that request by
/// serializing the carried response unchanged.
///
/// A completion resolves at most once since every resolving method consumes
/// it. A completion dropped without being resolved never produces a
/// response.
pub struct Completion {
    command: String,
    engine: Arc<dyn ExecutionEngine>,
    resolved: bool,
}

impl Completion {
    pub(crate) fn new(command: impl Into<String>, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            command: command.into(),
            engine,
            resolved: false,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Deliver `response`, marking it failed first if `error` is set
    pub fn complete(self, mut response: Response, error: Option<eyre::Report>) -> eyre::Result<()> {
        if let Some(error) = error {
            response.fail(format!("{error:#}"));
        }
        self.deliver(&response)
    }

    /// Deliver a successful response
    pub fn respond(self, response: Response) -> eyre::Result<()> {
        self.complete(response, None)
    }

    /// Deliver `response` marked as failed with `error`
    pub fn fail(self, mut response: Response, error: impl fmt::Display) -> eyre::Result<()> {
        response.fail(error.to_string());
        self.deliver(&response)
    }

    #[tracing::instrument(skip(self, response), fields(command = %self.command), level = "debug")]
    fn deliver(mut self, response: &Response) -> eyre::Result<()> {
        self.resolved = true;
        let carried = match serde_json::to_value(response) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "async response could not be encoded");
                serde_json::to_value(InternalError::new(
                    response.seq,
                    response.request_seq.unwrap_or_default(),
                    &e,
                ))
                .wrap_err("encoding internal error payload")?
            }
        };

        let mut arguments = Map::new();
        arguments.insert(ASYNC_RESPONSE.to_string(), carried);
        let envelope = Request::envelope(self.command.clone(), Some(arguments));
        let message = serde_json::to_string(&envelope).wrap_err("encoding async completion")?;
        tracing::debug!("delivering async response");
        self.engine
            .send_command(&message)
            .wrap_err("sending async completion")
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!(command = %self.command, "async command dropped without completing");
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("command", &self.command)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

/// Positional arguments for an agent command, ordered by `parameters`
pub(crate) fn positional_arguments(request: &Request, parameters: &[String]) -> Vec<Value> {
    parameters
        .iter()
        .map(|name| {
            request
                .arguments
                .as_ref()
                .and_then(|args| args.get(name))
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect()
}
