//! Debug protocol command dispatcher
//!
//! This crate routes JSON encoded debugger requests to registered command
//! handlers and produces JSON responses, tracking whether the debugged
//! program is running. Script evaluation and native command processing are
//! delegated to an [`ExecutionEngine`].
//!
//! ```
//! use std::sync::Arc;
//! use dispatcher::{Dispatcher, InMemoryEngine};
//!
//! let dispatcher = Dispatcher::new(Arc::new(InMemoryEngine::new()));
//! dispatcher.register_command("continue", |_request, response| {
//!     response.running = Some(true);
//!     Ok(())
//! });
//!
//! let reply = dispatcher.dispatch(r#"{"seq":1,"type":"request","command":"continue"}"#);
//! assert_eq!(
//!     reply.as_deref(),
//!     Some(r#"{"seq":0,"request_seq":1,"type":"response","command":"continue","success":true,"running":true}"#)
//! );
//! assert!(dispatcher.is_running());
//! ```
mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod framing;
mod handler;
mod lock;
pub mod request;
pub mod response;
mod script;

pub use dispatcher::{ACKNOWLEDGEMENT, Dispatcher, GENERIC_INTERNAL_ERROR};
pub use engine::{ExecutionEngine, InMemoryEngine};
pub use error::{DispatchError, FramingError};
pub use events::{LifecycleEvent, Listeners};
pub use handler::{AsyncHandler, Completion, Handler, SyncHandler};
pub use request::{Request, Seq};
pub use response::{MessageKind, Response};
pub use script::Script;
