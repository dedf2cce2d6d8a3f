use crate::{engine::Engine, sql::plan_and_exec, sql::Outcome};
use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

/// Written before every command read.
pub const PROMPT: &[u8] = b">> ";
/// First line of every successful response.
pub const SUCCESS: &str = "command executed successfully";
/// Closes the session without a response.
pub const EXIT: &str = "exit";
/// Longest accepted command line, newline included. A client that sends
/// more without a newline is disconnected.
pub const MAX_COMMAND_BYTES: usize = 64 * 1024;

/// Binds `addr` and serves clients until the task is dropped.
///
/// This function implements a line-oriented command protocol over TCP:
///
/// ## Protocol Features
/// - **Prompt**: `>> ` is written before every command is read
/// - **One command per line**: `\n` terminates a command, a trailing `\r` is ignored
/// - **Concurrent clients**: each connection runs in its own async task
/// - **Disconnect**: `exit` closes the connection without a response
/// - **Errors**: reported as `error: <message>`, the session stays open
/// - **Line limit**: a command over [`MAX_COMMAND_BYTES`] ends the session
///
/// ## Protocol Example
/// ```text
/// Server: >>
/// Client: INSERT INTO beer VALUES ('Duvel', 'Belgian Ale')
/// Server: command executed successfully
///         output:
///         1
/// Server: >>
/// Client: SELECT beer.name FROM beer
/// Server: command executed successfully
///         output:
///         beer.name
///         Duvel
/// Server: >>
/// Client: exit
/// ```
///
/// ## Arguments
/// * `engine` - Shared database engine instance
/// * `addr` - TCP bind address (e.g., "127.0.0.1:7432")
/// * `conn_timeout` - idle limit for every read; `None` waits forever
///
/// ## Returns
/// * `Err(_)` - binding or accepting failed
pub async fn serve(engine: Arc<Engine>, addr: &str, conn_timeout: Option<Duration>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    serve_listener(engine, listener, conn_timeout).await
}

/// Accept loop over an already bound listener.
pub async fn serve_listener(
    engine: Arc<Engine>,
    listener: TcpListener,
    conn_timeout: Option<Duration>,
) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "client connected");
        let engine = engine.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(engine, socket, peer, conn_timeout).await {
                warn!(%peer, error = %e, "connection failed");
            }
            info!(%peer, "client disconnected");
        });
    }
}

async fn handle_client(
    engine: Arc<Engine>,
    socket: TcpStream,
    peer: SocketAddr,
    conn_timeout: Option<Duration>,
) -> Result<()> {
    let (r, mut w) = socket.into_split();
    let mut reader = BufReader::new(r);
    let mut line = String::new();

    loop {
        w.write_all(PROMPT).await?;
        w.flush().await?;

        line.clear();
        let mut limited = (&mut reader).take(MAX_COMMAND_BYTES as u64);
        let read = limited.read_line(&mut line);
        let n = match conn_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(n) => n?,
                Err(_) => {
                    info!(%peer, ?limit, "idle timeout");
                    return Ok(());
                }
            },
            None => read.await?,
        };
        if n == 0 {
            return Ok(());
        }
        if !line.ends_with('\n') && n == MAX_COMMAND_BYTES {
            warn!(%peer, limit = MAX_COMMAND_BYTES, "command too long");
            w.write_all(format!("error: command longer than {MAX_COMMAND_BYTES} bytes\n").as_bytes())
                .await?;
            return Ok(());
        }

        let command = line.trim_end_matches(['\n', '\r']);
        if command.trim() == EXIT {
            return Ok(());
        }
        debug!(%peer, command, "received");

        match plan_and_exec(engine.clone(), command.to_string()).await {
            Ok(outcome) => write_success(&mut w, &outcome).await?,
            Err(e) => {
                debug!(%peer, error = %e, "command failed");
                w.write_all(format!("error: {}\n", e).as_bytes()).await?;
            }
        }
    }
}

async fn write_success<W: AsyncWrite + Unpin>(w: &mut W, outcome: &Outcome) -> Result<()> {
    let mut response = format!("{SUCCESS}\n");
    if let Some(payload) = outcome.payload() {
        response.push_str("output:\n");
        response.push_str(&payload);
        if !payload.ends_with('\n') {
            response.push('\n');
        }
    }
    w.write_all(response.as_bytes()).await?;
    Ok(())
}
