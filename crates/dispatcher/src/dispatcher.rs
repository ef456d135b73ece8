use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use eyre::WrapErr;
use serde_json::{Map, Value};

use crate::engine::ExecutionEngine;
use crate::error::DispatchError;
use crate::events::{LifecycleEvent, Listeners};
use crate::handler::{Completion, Handler, positional_arguments};
use crate::lock::with_lock;
use crate::request::{MAX_STRING_LENGTH, Request, Seq};
use crate::response::{InternalError, Response};
use crate::script::Script;

/// Returned to the caller of an async command; the real result follows later
pub const ACKNOWLEDGEMENT: &str = r#"{"seq":0,"type":"response","success":true}"#;

/// Returned when a request could not be processed at all
pub const GENERIC_INTERNAL_ERROR: &str =
    r#"{"seq":0,"type":"response","success":false,"message":"Internal error"}"#;

/// Debug protocol command dispatcher
///
/// Routes JSON requests to registered handlers and always answers a known
/// command with a well formed JSON response, however the handler behaves.
/// Failures are contained at three levels:
///
/// 1. a failing or panicking handler produces a `success: false` response
///    carrying the failure text,
/// 2. a response that cannot be serialized is replaced by a fixed payload
///    that still carries its sequence numbers,
/// 3. anything else, such as a request that is not JSON, produces
///    [`GENERIC_INTERNAL_ERROR`].
///
/// Unknown commands produce no output at all so that callers can chain
/// dispatchers, see [`Dispatcher::process_debug_request`].
pub struct Dispatcher {
    handlers: Mutex<HashMap<String, Handler>>,
    running: AtomicBool,
    response_seq: AtomicI64,
    agent_protocol: AtomicBool,
    engine: Arc<dyn ExecutionEngine>,
    listeners: Listeners,
}

impl Dispatcher {
    /// Create a dispatcher sending its outbound commands to `engine`
    ///
    /// A `disconnect` handler publishing [`LifecycleEvent::Close`] is
    /// registered up front.
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        let dispatcher = Self {
            handlers: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            response_seq: AtomicI64::new(0),
            agent_protocol: AtomicBool::new(false),
            engine,
            listeners: Listeners::default(),
        };

        let listeners = dispatcher.listeners.clone();
        dispatcher.register_command("disconnect", move |_request, _response| {
            listeners.publish(LifecycleEvent::Close);
            Ok(())
        });

        dispatcher
    }

    /// Install a synchronous handler for `name`, replacing any existing handler
    pub fn register_command<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Request, &mut Response) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.install(name.into(), Handler::Sync(Arc::new(handler)));
    }

    /// Install an asynchronous handler for `name`, replacing any existing handler
    pub fn register_async_command<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Request, Response, Completion) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.install(name.into(), Handler::Async(Arc::new(handler)));
    }

    /// Answer requests for `name` with an event of the same name
    ///
    /// The request's arguments become the event body, which lets a caller
    /// raise an event by sending a command through the engine.
    pub fn register_event(&self, name: impl Into<String>) {
        self.register_command(name, |request, response| {
            response.convert_to_event(request.arguments.as_ref());
            Ok(())
        });
    }

    pub fn enable_agent_protocol(&self) {
        if self.agent_protocol.swap(true, Ordering::SeqCst) {
            tracing::debug!("agent protocol already enabled");
        }
    }

    /// Install an agent command
    ///
    /// The callback receives the request arguments named by `parameters`,
    /// in that order, with missing arguments as `null`.
    pub fn register_agent_command<F, P>(
        &self,
        name: impl Into<String>,
        parameters: P,
        callback: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(&[Value], &mut Response) -> eyre::Result<()> + Send + Sync + 'static,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let name = name.into();
        if !self.agent_protocol.load(Ordering::SeqCst) {
            return Err(DispatchError::AgentProtocolDisabled(name));
        }

        let parameters: Vec<String> = parameters.into_iter().map(Into::into).collect();
        self.register_command(name, move |request, response| {
            let args = positional_arguments(request, &parameters);
            callback(&args, response)
        });
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handler(name).is_some()
    }

    /// Register a listener for lifecycle events
    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        self.listeners.subscribe()
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Whether the debugged program is considered running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.engine
    }

    /// Push a request for `name` into the execution engine
    #[tracing::instrument(skip(self, attributes), level = "debug")]
    pub fn send_command(&self, name: &str, attributes: Option<Map<String, Value>>) -> eyre::Result<()> {
        let envelope = Request::envelope(name, attributes);
        let message = serde_json::to_string(&envelope).wrap_err("encoding request envelope")?;
        tracing::debug!(%message, "sending command to engine");
        self.engine
            .send_command(&message)
            .wrap_err_with(|| format!("sending command {name}"))
    }

    /// Raise an event registered with [`Dispatcher::register_event`]
    pub fn emit(&self, name: &str, attributes: Option<Map<String, Value>>) -> eyre::Result<()> {
        self.send_command(name, attributes)
    }

    /// Run a script in the engine's debug context
    #[tracing::instrument(skip(self, script), level = "debug")]
    pub fn run_in_debug_context(&self, script: Script<'_>) -> eyre::Result<Value> {
        let source = script.normalize();
        tracing::trace!(%source, "running injected script");
        self.engine.run_script(&source)
    }

    /// Process a request, falling back to the engine's native processor
    /// when no handler is registered for the command
    pub fn process_debug_request(&self, raw: &str) -> Option<String> {
        self.dispatch(raw).or_else(|| {
            tracing::debug!("request not handled, forwarding to engine");
            self.engine.process_request(raw)
        })
    }

    /// Process a raw JSON request
    ///
    /// Returns `None` when no handler is registered for the command.
    #[tracing::instrument(skip(self, raw), level = "debug")]
    pub fn dispatch(&self, raw: &str) -> Option<String> {
        match self.try_dispatch(raw) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, raw, "request could not be processed");
                Some(GENERIC_INTERNAL_ERROR.to_string())
            }
        }
    }

    fn try_dispatch(&self, raw: &str) -> eyre::Result<Option<String>> {
        let value: Value = serde_json::from_str(raw).wrap_err("parsing request")?;
        let command = value
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("request has no command"))?;

        // unhandled requests are left for the engine, however odd the rest of them
        let Some(handler) = self.handler(command) else {
            tracing::debug!(%command, "no handler registered");
            return Ok(None);
        };

        let request: Request = serde_json::from_value(value).wrap_err("decoding request")?;
        let seq = self.next_seq();
        let new_response = || {
            let mut response = Response::for_request(seq, &request);
            if let Some(max_string_length) = request.argument(MAX_STRING_LENGTH) {
                response.set_option(MAX_STRING_LENGTH, max_string_length.clone());
            }
            response
        };
        let mut response = new_response();
        if let Some(carried) = request.async_response() {
            tracing::debug!(command = %request.command, "delivering async response");
            let json = serde_json::to_string(carried).wrap_err("encoding async response")?;
            return Ok(Some(json));
        }

        let (mut response, failure) = match handler {
            Handler::Async(handler) => {
                let completion = Completion::new(request.command.clone(), Arc::clone(&self.engine));
                match contain(&request.command, || handler(&request, response, completion)) {
                    Ok(()) => {
                        tracing::debug!(command = %request.command, "async command started");
                        return Ok(Some(ACKNOWLEDGEMENT.to_string()));
                    }
                    // the handler took the response, rebuild it under the same seq
                    Err(message) => (new_response(), Some(message)),
                }
            }
            Handler::Sync(handler) => {
                let result = contain(&request.command, || handler(&request, &mut response));
                (response, result.err())
            }
        };

        if let Some(message) = failure {
            response.fail(message);
        }

        self.apply_run_state(&mut response);
        Ok(Some(self.serialize(&request, &response)?))
    }

    fn apply_run_state(&self, response: &mut Response) {
        if let Some(running) = response.running {
            let previous = self.running.swap(running, Ordering::SeqCst);
            if previous != running {
                tracing::debug!(running, "run state changed");
            }
        }
        response.running = Some(self.running.load(Ordering::SeqCst));
    }

    fn serialize(&self, request: &Request, response: &Response) -> eyre::Result<String> {
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| serde_json::to_string(response))) {
            Ok(Ok(json)) => return Ok(json),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("serializer panicked: {}", panic_reason(payload.as_ref())),
        };
        tracing::warn!(error = %reason, command = %request.command, "response could not be serialized");
        let payload = InternalError::new(response.seq, request.seq, &reason);
        serde_json::to_string(&payload).wrap_err("encoding internal error payload")
    }

    fn install(&self, name: String, handler: Handler) {
        tracing::debug!(command = %name, kind = handler.kind(), "registering handler");
        with_lock("Dispatcher.handlers", &self.handlers, |mut handlers| {
            if let Some(previous) = handlers.insert(name, handler) {
                tracing::debug!(replaced = previous.kind(), "replaced existing handler");
            }
        });
    }

    fn handler(&self, command: &str) -> Option<Handler> {
        with_lock("Dispatcher.handlers", &self.handlers, |handlers| {
            handlers.get(command).cloned()
        })
    }

    fn next_seq(&self) -> Seq {
        self.response_seq.fetch_add(1, Ordering::SeqCst)
    }
}

/// Run a handler, turning errors and panics into a failure description
fn contain<F>(command: &str, f: F) -> Result<(), String>
where
    F: FnOnce() -> eyre::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::warn!(%command, error = %e, "handler failed");
            Err(format!("{e:#}"))
        }
        Err(payload) => {
            let error = DispatchError::HandlerPanicked {
                command: command.to_string(),
                reason: panic_reason(payload.as_ref()),
            };
            tracing::warn!(error = %error, "handler panicked");
            Err(error.to_string())
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::InMemoryEngine;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(InMemoryEngine::new()))
    }

    fn parse(output: Option<String>) -> Value {
        serde_json::from_str(&output.expect("a response")).expect("valid json")
    }

    #[test]
    fn response_sequence_numbers_increase() {
        let dispatcher = dispatcher();
        dispatcher.register_command("noop", |_, _| Ok(()));

        let first = parse(dispatcher.dispatch(r#"{"seq":1,"command":"noop"}"#));
        let second = parse(dispatcher.dispatch(r#"{"seq":2,"command":"noop"}"#));

        assert_eq!(first["seq"], json!(0));
        assert_eq!(second["seq"], json!(1));
    }

    #[test]
    fn registration_replaces_other_kind() {
        let dispatcher = dispatcher();
        dispatcher.register_async_command("step", |_, _, _| Ok(()));
        dispatcher.register_command("step", |_, response| {
            response.set_body(json!("sync"));
            Ok(())
        });

        let value = parse(dispatcher.dispatch(r#"{"command":"step"}"#));
        assert_eq!(value["body"], json!("sync"));
    }

    #[test]
    fn handlers_may_register_commands() {
        let dispatcher = Arc::new(dispatcher());
        let inner = Arc::clone(&dispatcher);
        dispatcher.register_command("install", move |_, _| {
            inner.register_command("installed", |_, _| Ok(()));
            Ok(())
        });

        assert!(dispatcher.dispatch(r#"{"command":"install"}"#).is_some());
        assert!(dispatcher.is_registered("installed"));
    }

    #[test]
    fn async_handler_failure_keeps_response_identity() {
        let dispatcher = dispatcher();
        dispatcher.register_async_command("fetch", |_, _, _| eyre::bail!("refused"));

        let value = parse(dispatcher.dispatch(r#"{"seq":8,"command":"fetch"}"#));
        assert_eq!(value["seq"], json!(0));
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["message"], json!("refused"));
        assert_eq!(value["request_seq"], json!(8));
        assert_eq!(value["command"], json!("fetch"));
        assert_eq!(value["running"], json!(false));

        // no sequence number was spent on the failure
        dispatcher.register_command("noop", |_, _| Ok(()));
        let next = parse(dispatcher.dispatch(r#"{"seq":9,"command":"noop"}"#));
        assert_eq!(next["seq"], json!(1));
    }

    #[test]
    fn panic_reason_from_payload() {
        assert_eq!(panic_reason(&"static"), "static");
        assert_eq!(panic_reason(&"owned".to_string()), "owned");
        assert_eq!(panic_reason(&5u8), "unknown panic payload");
    }
}
