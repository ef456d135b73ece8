//! Commands served by the relay
use std::thread;
use std::time::Duration;

use dispatcher::Dispatcher;
use serde_json::{Value, json};

use crate::config::Config;

pub fn install(dispatcher: &Dispatcher, config: &Config) {
    dispatcher.register_command("version", |_request, response| {
        response.set_body(json!({"version": env!("CARGO_PKG_VERSION")}));
        Ok(())
    });

    dispatcher.register_command("continue", |_request, response| {
        response.running = Some(true);
        Ok(())
    });

    dispatcher.register_command("suspend", |_request, response| {
        response.running = Some(false);
        Ok(())
    });

    dispatcher.register_async_command("delay", |request, mut response, completion| {
        let ms = request
            .argument("ms")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        thread::Builder::new()
            .name("delay".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_millis(ms));
                response.set_body(json!({"delayed": ms}));
                if let Err(e) = completion.respond(response) {
                    tracing::warn!(error = %e, "delivering delayed response");
                }
            })?;
        Ok(())
    });

    for event in &config.events {
        tracing::debug!(%event, "registering event");
        dispatcher.register_event(event.as_str());
    }
}
