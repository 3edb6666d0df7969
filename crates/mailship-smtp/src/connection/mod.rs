//! SMTP connection lifecycle: factory, command engine, session setup.

mod stream;

pub use stream::{MaybeTlsStream, tls_connector};

use crate::auth;
use crate::command::Command;
use crate::config::SmtpConfig;
use crate::error::{Error, Result};
use crate::parser::{ReplyAccumulator, ReplyProgress};
use crate::types::{Reply, ReplyCode, ServerCapabilities};
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// An established SMTP connection.
///
/// Owns the socket, its read buffer, and the capabilities from the most
/// recent EHLO. One connection serves one command at a time; concurrent
/// sends go through the pool, never through a shared connection.
#[derive(Debug)]
pub struct SmtpConnection<S = TcpStream> {
    stream: MaybeTlsStream<S>,
    read_buf: BytesMut,
    accumulator: ReplyAccumulator,
    command_timeout: Duration,
    capabilities: ServerCapabilities,
    open: bool,
}

impl<S> SmtpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected stream.
    ///
    /// The server greeting has not been read yet; call [`Self::greet`]
    /// before sending commands. Mostly useful for tests and custom
    /// transports; real connections come from [`SmtpConnection::connect`].
    #[must_use]
    pub fn from_stream(stream: MaybeTlsStream<S>, command_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            accumulator: ReplyAccumulator::new(),
            command_timeout,
            capabilities: ServerCapabilities::default(),
            open: true,
        }
    }

    /// Awaits the 220 greeting that opens every SMTP session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] on any other greeting code.
    pub async fn greet(&mut self) -> Result<Reply> {
        let reply = self.read_reply().await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(Error::Connect(format!(
                "unexpected greeting: {} {}",
                reply.code,
                reply.message_text()
            )));
        }
        Ok(reply)
    }

    /// Sends one command and awaits its complete reply.
    ///
    /// The whole exchange runs under the per-command deadline. A reply code
    /// outside `expected` fails with [`Error::UnexpectedReply`]; the
    /// connection itself is left as-is, the caller decides whether to keep
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandTimeout`] when the deadline elapses, I/O and
    /// protocol errors from the transport, or [`Error::UnexpectedReply`] on
    /// a code mismatch.
    pub async fn command(&mut self, command: Command, expected: &[u16]) -> Result<Reply> {
        let name = command.name();
        let deadline = self.command_timeout;
        let wire = command.serialize();
        let exchange = async {
            self.stream.write_all(&wire).await?;
            self.stream.flush().await?;
            self.read_reply().await
        };
        let reply = match timeout(deadline, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(Error::CommandTimeout {
                    command: name.to_string(),
                    duration: deadline,
                });
            }
        };
        tracing::debug!(command = name, code = reply.code.as_u16(), "smtp exchange");
        if !expected.contains(&reply.code.as_u16()) {
            return Err(Error::unexpected_reply(expected, reply));
        }
        Ok(reply)
    }

    /// Sends EHLO and records the advertised capabilities.
    ///
    /// The first reply line is the server banner and is not a capability.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails or EHLO is rejected.
    pub async fn ehlo(&mut self, domain: &str) -> Result<&ServerCapabilities> {
        let reply = self
            .command(
                Command::Ehlo {
                    hostname: domain.to_string(),
                },
                &[250],
            )
            .await?;
        self.capabilities =
            ServerCapabilities::parse_lines(reply.message.get(1..).unwrap_or_default());
        Ok(&self.capabilities)
    }

    /// Upgrades the connection to TLS in place via STARTTLS.
    ///
    /// Consumes the connection so a failed handshake cannot leak a
    /// half-upgraded socket. The read buffer and the recorded capabilities
    /// are discarded: bytes buffered before the handshake arrived in the
    /// clear, and pre-upgrade capabilities are not trustworthy. The caller
    /// must issue EHLO again on the returned connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects STARTTLS or the stream is
    /// already TLS. A handshake that fails or outlives the command
    /// deadline surfaces as [`Error::Tls`].
    pub async fn starttls(mut self, config: &SmtpConfig) -> Result<Self> {
        if self.stream.is_tls() {
            return Err(Error::Protocol("stream is already TLS".to_string()));
        }
        self.command(Command::StartTls, &[220]).await?;

        self.read_buf.clear();
        self.accumulator = ReplyAccumulator::new();
        self.capabilities = ServerCapabilities::default();

        let connector = tls_connector(config.reject_unauthorized);
        let name = stream::server_name(&config.host)?;
        let deadline = self.command_timeout;
        self.stream = match timeout(deadline, self.stream.upgrade(&connector, name)).await {
            Ok(upgraded) => upgraded?,
            Err(_) => {
                return Err(Error::Tls(rustls::Error::General(format!(
                    "handshake timed out after {deadline:?}"
                ))));
            }
        };
        tracing::debug!(host = %config.host, "connection upgraded to TLS");
        Ok(self)
    }

    /// Clears any in-progress mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if RSET is rejected.
    pub async fn rset(&mut self) -> Result<()> {
        self.command(Command::Rset, &[250]).await?;
        Ok(())
    }

    /// Cheap server liveness check.
    ///
    /// # Errors
    ///
    /// Returns an error if NOOP is rejected.
    pub async fn noop(&mut self) -> Result<()> {
        self.command(Command::Noop, &[250]).await?;
        Ok(())
    }

    /// Sends QUIT and shuts the socket down.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails; the socket is closed either
    /// way because the connection is consumed.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.command(Command::Quit, &[221, 250]).await;
        self.open = false;
        let _ = self.stream.shutdown().await;
        result.map(|_| ())
    }

    /// Transmits message data after a 354 reply to DATA.
    ///
    /// Lines are CRLF-normalized, leading dots are doubled, and the
    /// `CRLF.CRLF` terminator is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if transmission fails or the server does not accept
    /// the message with 250.
    pub async fn send_message(&mut self, message: &str) -> Result<Reply> {
        let body = dot_stuff(message);
        let deadline = self.command_timeout;
        let exchange = async {
            self.stream.write_all(&body).await?;
            self.stream.write_all(b".\r\n").await?;
            self.stream.flush().await?;
            self.read_reply().await
        };
        let reply = match timeout(deadline, exchange).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(Error::CommandTimeout {
                    command: "message data".to_string(),
                    duration: deadline,
                });
            }
        };
        if reply.code != ReplyCode::OK {
            return Err(Error::unexpected_reply(&[250], reply));
        }
        Ok(reply)
    }

    /// Capabilities from the most recent EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Returns true if the transport is TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    /// Returns false once the peer closed the stream or QUIT was sent.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Reads until the accumulator yields a complete reply group.
    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let ReplyProgress::Complete(reply) = self.accumulator.feed(&mut self.read_buf)? {
                return Ok(reply);
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                self.open = false;
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }
}

impl SmtpConnection<TcpStream> {
    /// Opens a connection and awaits the 220 greeting.
    ///
    /// Implicit TLS is used when the configuration says `secure`. One timer
    /// spans dialing, the optional handshake, and the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectTimeout`] when the deadline elapses, or
    /// [`Error::Connect`] / [`Error::Tls`] on failure.
    pub async fn connect(config: &SmtpConfig) -> Result<Self> {
        match timeout(config.connect_timeout, Self::dial(config)).await {
            Ok(conn) => conn,
            Err(_) => Err(Error::ConnectTimeout(config.connect_timeout)),
        }
    }

    /// Runs the full session setup: connect, EHLO, optional STARTTLS with a
    /// second EHLO, then authentication.
    ///
    /// EHLO goes out exactly once per channel: once in plaintext, and once
    /// more only after a TLS upgrade replaced the channel.
    ///
    /// # Errors
    ///
    /// Returns the first connect, TLS, protocol, or authentication error.
    pub async fn establish(config: &SmtpConfig) -> Result<Self> {
        let mut conn = Self::connect(config).await?;
        conn.ehlo(&config.ehlo_domain).await?;

        if !conn.is_tls() && conn.capabilities().supports_starttls() {
            conn = conn.starttls(config).await?;
            conn.ehlo(&config.ehlo_domain).await?;
        }

        auth::authenticate(&mut conn, config).await?;
        Ok(conn)
    }

    async fn dial(config: &SmtpConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;

        let stream = if config.secure {
            let connector = tls_connector(config.reject_unauthorized);
            let name = stream::server_name(&config.host)?;
            let tls = connector
                .connect(name, tcp)
                .await
                .map_err(stream::handshake_error)?;
            MaybeTlsStream::tls(tls)
        } else {
            MaybeTlsStream::plain(tcp)
        };

        let mut conn = Self::from_stream(stream, config.command_timeout);
        let greeting = conn.greet().await?;
        tracing::debug!(
            host = %config.host,
            port = config.port,
            tls = conn.is_tls(),
            greeting = %greeting.first_line(),
            "smtp connection established"
        );
        Ok(conn)
    }
}

/// Normalizes line endings to CRLF and doubles leading dots.
///
/// A trailing newline does not produce an extra blank line; the terminator
/// is appended by the caller.
fn dot_stuff(message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let mut lines = message.split('\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if lines.peek().is_none() && line.is_empty() {
            break;
        }
        if line.as_bytes().first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}
