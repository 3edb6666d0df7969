//! The outbound provider: send orchestration over a pooled SMTP client.

use crate::dkim::{DkimConfig, DkimSigner};
use crate::error::{Error, Result};
use crate::options::{EmailOptions, SendReceipt};
use chrono::Utc;
use mailship_smtp::{
    Address, Command, Disposition, Error as SmtpError, SmtpConfig, SmtpConnection, SmtpPool,
};
use uuid::Uuid;

/// Sends mail through a pooled SMTP connection, optionally signing each
/// message with DKIM.
///
/// One provider owns one pool. Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct SmtpProvider {
    name: String,
    pool: SmtpPool,
    dkim: Option<DkimSigner>,
}

impl SmtpProvider {
    /// Creates a provider named `smtp` for the given server.
    #[must_use]
    pub fn new(config: SmtpConfig) -> Self {
        Self::with_name("smtp", config)
    }

    /// Creates a provider with a custom name. The name appears in send
    /// receipts and log lines.
    #[must_use]
    pub fn with_name(name: impl Into<String>, config: SmtpConfig) -> Self {
        Self {
            name: name.into(),
            pool: SmtpPool::new(config),
            dkim: None,
        }
    }

    /// Enables DKIM signing for outgoing messages.
    ///
    /// A key or configuration problem disables signing rather than the
    /// provider; messages then go out unsigned.
    #[must_use]
    pub fn dkim(mut self, config: &DkimConfig) -> Self {
        match DkimSigner::new(config) {
            Ok(signer) => self.dkim = Some(signer),
            Err(err) => {
                tracing::warn!(error = %err, "DKIM disabled");
            }
        }
        self
    }

    /// Returns the provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the configuration. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the server settings are
    /// incomplete or contradictory.
    pub fn initialize(&self) -> Result<()> {
        let config = self.pool.config();
        config.validate()?;
        tracing::info!(
            provider = %self.name,
            host = %config.host,
            port = config.port,
            "SMTP provider initialized"
        );
        Ok(())
    }

    /// Checks whether the server is reachable and answering.
    ///
    /// Opens a fresh connection outside the pool, exchanges a NOOP and
    /// disconnects. Failures are reported as `false`, never as errors.
    pub async fn is_available(&self) -> bool {
        match self.probe().await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(provider = %self.name, error = %err, "availability probe failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<()> {
        let mut conn = SmtpConnection::connect(self.pool.config()).await?;
        conn.noop().await?;
        conn.quit().await?;
        Ok(())
    }

    /// Runs the full connect, TLS and login handshake, then disconnects.
    ///
    /// # Errors
    ///
    /// Rejected credentials yield `Ok(false)`. Anything that prevents the
    /// check from completing, an unreachable server or a TLS failure for
    /// example, is returned as an error.
    pub async fn validate_credentials(&self) -> Result<bool> {
        match SmtpConnection::establish(self.pool.config()).await {
            Ok(conn) => {
                if let Err(err) = conn.quit().await {
                    tracing::debug!(error = %err, "QUIT after credential check failed");
                }
                Ok(true)
            }
            Err(SmtpError::Authentication { code, message }) => {
                tracing::warn!(
                    provider = %self.name,
                    code,
                    %message,
                    "credential validation rejected"
                );
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Sends an email and returns a receipt.
    ///
    /// The transaction runs on a pooled connection: MAIL FROM, one RCPT TO
    /// per recipient (to, cc and bcc alike), DATA, then the message text.
    /// On success the connection is reset and handed back to the pool;
    /// after any failure it is closed instead so a half-finished
    /// transaction can never leak into the next send. Nothing is retried
    /// here, retry policy belongs to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] for unsendable messages and the
    /// underlying SMTP error for everything else.
    pub async fn send_email(&self, options: &EmailOptions) -> Result<SendReceipt> {
        options.validate()?;

        let from = parse_address(&options.from)?;
        let envelope = options.all_recipients();
        let mut recipients = Vec::with_capacity(envelope.len());
        for addr in envelope {
            recipients.push(parse_address(addr)?);
        }

        let timestamp = Utc::now();
        let message_id = message_id(&from);
        let mut message = options.to_mime(&message_id, &timestamp.to_rfc2822());
        if let Some(signer) = &self.dkim {
            message = signer.sign(&message);
        }

        let mut conn = self.pool.acquire().await?;
        match transact(&mut conn, &from, &recipients, &message).await {
            Ok(()) => {
                self.pool.release(conn, Disposition::Reuse).await;
                tracing::info!(
                    provider = %self.name,
                    %message_id,
                    recipients = recipients.len(),
                    "message sent"
                );
                Ok(SendReceipt {
                    message_id,
                    provider: self.name.clone(),
                    sent: true,
                    timestamp,
                })
            }
            Err(err) => {
                self.pool.release(conn, Disposition::Discard).await;
                Err(err.into())
            }
        }
    }

    /// Shuts the provider down. Idle connections receive a QUIT and
    /// queued acquirers are rejected. Safe to call more than once.
    pub async fn shutdown(&self) {
        tracing::info!(provider = %self.name, "shutting down");
        self.pool.shutdown().await;
    }
}

fn parse_address(addr: &str) -> Result<Address> {
    Address::new(addr).map_err(|err| Error::InvalidMessage(err.to_string()))
}

/// Builds a Message-ID from a fresh UUID and the sender domain.
fn message_id(from: &Address) -> String {
    let domain = from
        .as_str()
        .split_once('@')
        .map_or("localhost", |(_, domain)| domain);
    format!("<{}@{domain}>", Uuid::new_v4())
}

/// The mail transaction proper. Any error leaves the connection in an
/// unknown state, so callers must discard it on failure.
async fn transact(
    conn: &mut SmtpConnection,
    from: &Address,
    recipients: &[Address],
    message: &str,
) -> mailship_smtp::Result<()> {
    conn.command(Command::MailFrom { from: from.clone() }, &[250])
        .await?;
    for recipient in recipients {
        conn.command(Command::RcptTo { to: recipient.clone() }, &[250, 251])
            .await?;
    }
    conn.command(Command::Data, &[354]).await?;
    conn.send_message(message).await?;
    Ok(())
}
