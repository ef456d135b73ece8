//! Responses built while processing a [`crate::request::Request`]
use std::fmt;

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::request::{Request, Seq};

/// Kind of outgoing protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Response,
    Event,
}

type Encoder = dyn Fn() -> serde_json::Result<Value> + Send + Sync;

/// Response payload, encoded lazily when the response is serialized
struct Body(Box<Encoder>);

impl Body {
    fn new<T>(body: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self(Box::new(move || serde_json::to_value(&body)))
    }

    fn encode(&self) -> serde_json::Result<Value> {
        (self.0)()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body(..)")
    }
}

/// Mutable response builder
///
/// A response is created at the start of request processing, mutated by the
/// handler and serialized exactly once. Serialization preserves the field
/// order debugging clients expect:
/// `seq, request_seq, type, command|event, success, body, message, running`
/// followed by any options.
#[derive(Debug)]
pub struct Response {
    pub seq: Seq,
    pub request_seq: Option<Seq>,
    pub kind: MessageKind,
    pub command: Option<String>,
    pub event: Option<String>,
    pub success: bool,
    pub message: Option<String>,
    /// Explicit run-state override, stamped with the current state on serialization
    pub running: Option<bool>,
    body: Option<Body>,
    options: Map<String, Value>,
}

impl Response {
    /// A response bound to `request`
    pub fn for_request(seq: Seq, request: &Request) -> Self {
        Self {
            request_seq: Some(request.seq),
            command: Some(request.command.clone()),
            ..Self::bare(seq)
        }
    }

    /// A response not bound to any command
    pub fn bare(seq: Seq) -> Self {
        Self {
            seq,
            request_seq: None,
            kind: MessageKind::Response,
            command: None,
            event: None,
            success: true,
            message: None,
            running: None,
            body: None,
            options: Map::new(),
        }
    }

    /// Set the response body
    ///
    /// The body is only encoded when the response is serialized, so a body
    /// that fails to encode is reported by the dispatcher's serialization
    /// error path rather than here.
    pub fn set_body<T>(&mut self, body: T)
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body = Some(Body::new(body));
    }

    pub fn clear_body(&mut self) {
        self.body = None;
    }

    /// Encode the current body, if any
    pub fn body(&self) -> Option<serde_json::Result<Value>> {
        self.body.as_ref().map(Body::encode)
    }

    pub fn set_option(&mut self, name: impl Into<String>, value: Value) {
        self.options.insert(name.into(), value);
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Mark the response as failed with the given description
    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.message = Some(message.into());
    }

    /// Turn this response into an outgoing event named after its command
    ///
    /// The request's arguments become the event body. Fields that only make
    /// sense for a command/response pair are removed.
    pub fn convert_to_event(&mut self, arguments: Option<&Map<String, Value>>) {
        self.kind = MessageKind::Event;
        self.event = self.command.take();
        self.request_seq = None;
        self.set_body(Value::Object(arguments.cloned().unwrap_or_default()));
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("seq", &self.seq)?;
        if let Some(request_seq) = self.request_seq {
            map.serialize_entry("request_seq", &request_seq)?;
        }
        map.serialize_entry("type", &self.kind)?;
        if let Some(command) = &self.command {
            map.serialize_entry("command", command)?;
        }
        if let Some(event) = &self.event {
            map.serialize_entry("event", event)?;
        }
        map.serialize_entry("success", &self.success)?;
        if let Some(body) = &self.body {
            let body = body.encode().map_err(S::Error::custom)?;
            map.serialize_entry("body", &body)?;
        }
        if let Some(message) = &self.message {
            map.serialize_entry("message", message)?;
        }
        if let Some(running) = self.running {
            map.serialize_entry("running", &running)?;
        }
        for (name, value) in &self.options {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Fixed-shape payload returned when a response cannot be serialized
#[derive(Debug, Serialize)]
pub(crate) struct InternalError {
    seq: Seq,
    request_seq: Seq,
    #[serde(rename = "type")]
    kind: MessageKind,
    success: bool,
    message: String,
}

impl InternalError {
    pub(crate) fn new(seq: Seq, request_seq: Seq, error: &dyn fmt::Display) -> Self {
        Self {
            seq,
            request_seq,
            kind: MessageKind::Response,
            success: false,
            message: format!("Internal error: {error}"),
        }
    }
}
