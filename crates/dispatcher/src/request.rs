//! Requests received by the dispatcher
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Seq = i64;

/// Argument key carrying the result of a previously started async command
pub const ASYNC_RESPONSE: &str = "asyncResponse";

/// Argument key forwarded to the response as an option
pub const MAX_STRING_LENGTH: &str = "maxStringLength";

/// An incoming debugger request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub seq: Seq,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

impl Request {
    /// Build the envelope used to push a command into the execution engine
    pub fn envelope(command: impl Into<String>, arguments: Option<Map<String, Value>>) -> Self {
        Self {
            seq: 0,
            r#type: Some("request".to_string()),
            command: command.into(),
            arguments: Some(arguments.unwrap_or_default()),
        }
    }

    /// Look up a single argument, treating JSON `null` as absent
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .as_ref()
            .and_then(|args| args.get(name))
            .filter(|value| !value.is_null())
    }

    pub(crate) fn async_response(&self) -> Option<&Value> {
        self.argument(ASYNC_RESPONSE)
    }
}
