// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Line-oriented console server
//!
//! One tokio task accepts connections; every session runs in its own task
//! tracked by a [`TaskTracker`]. Blocking work (the login check and command
//! invocation) goes to the blocking pool so a slow endpoint never stalls the
//! accept loop.
//!
//! Protocol, all output CRLF-terminated:
//!
//! - optional login exchange: `login: ` then `password: `, three attempts,
//!   then `Access denied` and the session closes
//! - `<prompt> ` before every line; the first word names the command, the
//!   rest are its arguments
//! - `exit` / `quit` end the session, blank lines are ignored
//! - unknown names print `Command not found: <name>`, failures print
//!   `error: <message>`

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::security::SecurityCheck;
use crate::domain::session::{
    CommandResolver, SessionError, SessionServer, SessionSettings, Transport,
};

const MAX_LINE_BYTES: usize = 8 * 1024;
const MAX_LOGIN_ATTEMPTS: u32 = 3;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct LineSessionServer {
    settings: SessionSettings,
    running: Option<Running>,
}

struct Running {
    shutdown: CancellationToken,
    sessions: TaskTracker,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// What a single session needs, shared by every session of one server
struct SessionContext {
    prompt: String,
    resolver: Arc<dyn CommandResolver>,
    security: Arc<dyn SecurityCheck>,
    require_login: bool,
}

impl LineSessionServer {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn context(&self) -> SessionContext {
        SessionContext {
            prompt: self.settings.prompt.clone(),
            resolver: Arc::clone(&self.settings.resolver),
            security: Arc::clone(&self.settings.security),
            require_login: self.settings.require_login,
        }
    }
}

#[async_trait]
impl SessionServer for LineSessionServer {
    fn transport(&self) -> Transport {
        self.settings.transport
    }

    async fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Ok(());
        }

        let address = format!("{}:{}", self.settings.bind_address, self.settings.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| SessionError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let sessions = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(self.context()),
            shutdown.clone(),
            sessions.clone(),
        ));

        info!(transport = %self.settings.transport, address = %local_addr, "Session server listening");

        self.running = Some(Running {
            shutdown,
            sessions,
            accept_task,
            local_addr,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.shutdown.cancel();
        running.sessions.close();
        let accept_result = running.accept_task.await;
        running.sessions.wait().await;

        info!(transport = %self.settings.transport, "Session server stopped");
        accept_result.map_err(|e| SessionError::Stop(e.to_string()))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }
}

impl Drop for LineSessionServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.cancel();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<SessionContext>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Session opened");
                    let context = Arc::clone(&context);
                    let cancelled = shutdown.child_token();
                    sessions.spawn(async move {
                        tokio::select! {
                            _ = cancelled.cancelled() => debug!(%peer, "Session cancelled"),
                            result = serve_session(stream, &context) => match result {
                                Ok(()) => debug!(%peer, "Session closed"),
                                Err(e) => debug!(%peer, error = %e, "Session ended with error"),
                            },
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept session");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}

async fn serve_session<S>(stream: S, context: &SessionContext) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    if context.require_login && !login(&mut reader, &mut writer, context).await? {
        return Ok(());
    }

    let prompt = format!("{} ", context.prompt);
    loop {
        write_prompt(&mut writer, &prompt).await?;

        let Some(line) = read_line(&mut reader).await? else {
            return Ok(());
        };

        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            continue;
        };
        if name == "exit" || name == "quit" {
            return Ok(());
        }

        let args: Vec<String> = words.map(str::to_string).collect();
        let reply = run_command(context, name, args).await;
        if !reply.is_empty() {
            write_line(&mut writer, &reply).await?;
        }
    }
}

async fn login<R, W>(reader: &mut R, writer: &mut W, context: &SessionContext) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for attempt in 1..=MAX_LOGIN_ATTEMPTS {
        write_prompt(writer, "login: ").await?;
        let Some(principal) = read_line(reader).await? else {
            return Ok(false);
        };
        write_prompt(writer, "password: ").await?;
        let Some(credential) = read_line(reader).await? else {
            return Ok(false);
        };

        let principal = principal.trim().to_string();
        let security = Arc::clone(&context.security);
        let checked = principal.clone();
        // The check blocks on the work dispatcher
        let allowed = tokio::task::spawn_blocking(move || security.check(&checked, &credential))
            .await
            .unwrap_or(false);

        if allowed {
            debug!(%principal, "Console login accepted");
            return Ok(true);
        }

        debug!(%principal, attempt, "Console login rejected");
        if attempt < MAX_LOGIN_ATTEMPTS {
            write_line(writer, "Login incorrect").await?;
        }
    }

    write_line(writer, "Access denied").await?;
    Ok(false)
}

async fn run_command(context: &SessionContext, name: &str, args: Vec<String>) -> String {
    let Some(command) = context.resolver.resolve(name) else {
        return format!("Command not found: {}", name);
    };

    match tokio::task::spawn_blocking(move || command.invoke(&args)).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => format!("error: {}", e),
        Err(e) => {
            warn!(command = %name, error = %e, "Command invocation aborted");
            format!("error: command '{}' aborted", name)
        }
    }
}

/// Next line without its terminator, `None` at end of stream.
async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    // Room for the longest allowed line plus its CRLF terminator
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES as u64 + 2)
        .read_until(b'\n', &mut buf)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if buf.len() > MAX_LINE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {} bytes", MAX_LINE_BYTES),
        ));
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

async fn write_prompt<W>(writer: &mut W, prompt: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(prompt.as_bytes()).await?;
    writer.flush().await
}

async fn write_line<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = text.lines().collect::<Vec<_>>().join("\r\n");
    out.push_str("\r\n");
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await
}
