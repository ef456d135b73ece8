//! Serving a dispatcher over a framed byte stream
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use dispatcher::framing::{self, FramedReader};
use dispatcher::{Dispatcher, InMemoryEngine, LifecycleEvent};
use eyre::WrapErr;

type SharedOutput = Arc<Mutex<dyn Write + Send>>;

/// Serve requests read from stdin, writing responses to stdout
pub fn stdio(dispatcher: Arc<Dispatcher>, engine: &InMemoryEngine) -> eyre::Result<()> {
    let stdin = io::stdin();
    serve(dispatcher, engine, stdin.lock(), io::stdout())
}

/// Accept a single TCP connection on `addr` and serve it
pub fn tcp<A>(dispatcher: Arc<Dispatcher>, engine: &InMemoryEngine, addr: A) -> eyre::Result<()>
where
    A: ToSocketAddrs,
{
    let listener = TcpListener::bind(addr).wrap_err("binding listen address")?;
    tracing::info!(addr = ?listener.local_addr().ok(), "waiting for debugging client");
    let (stream, peer) = listener.accept().wrap_err("accepting connection")?;
    tracing::info!(%peer, "debugging client connected");

    let input = BufReader::new(stream.try_clone().wrap_err("cloning connection")?);
    serve(dispatcher, engine, input, stream)
}

/// Serve framed requests from `input` until it closes or the client disconnects
///
/// Commands the dispatcher pushes into the engine, such as async
/// completions and emitted events, are processed on a background thread and
/// their replies written to the same output.
pub fn serve<R, W>(
    dispatcher: Arc<Dispatcher>,
    engine: &InMemoryEngine,
    input: R,
    output: W,
) -> eyre::Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let output: SharedOutput = Arc::new(Mutex::new(output));
    let closed = dispatcher.subscribe();

    let commands = engine.commands();
    let background_dispatcher = Arc::clone(&dispatcher);
    let background_output = Arc::clone(&output);
    thread::Builder::new()
        .name("engine-commands".to_string())
        .spawn(move || {
            for command in commands.iter() {
                if let Some(reply) = background_dispatcher.process_debug_request(&command) {
                    if let Err(e) = send(&background_output, &reply) {
                        tracing::warn!(error = %e, "writing engine reply");
                        return;
                    }
                }
            }
        })
        .wrap_err("spawning engine command thread")?;

    let mut reader = FramedReader::new(input);
    loop {
        let Some(request) = reader.poll_message().wrap_err("reading request")? else {
            tracing::debug!("input closed");
            return Ok(());
        };

        match dispatcher.process_debug_request(&request) {
            Some(reply) => send(&output, &reply).wrap_err("writing reply")?,
            None => tracing::debug!(%request, "no handler for request"),
        }

        if let Ok(LifecycleEvent::Close) = closed.try_recv() {
            tracing::info!("debugging client disconnected");
            return Ok(());
        }
    }
}

fn send(output: &SharedOutput, message: &str) -> eyre::Result<()> {
    let mut output = output.lock().unwrap_or_else(PoisonError::into_inner);
    framing::write_message(&mut *output, message)?;
    Ok(())
}
