//! # mailship-smtp
//!
//! An async SMTP client implementing the RFC 5321 subset needed for
//! transactional mail delivery.
//!
//! ## Features
//!
//! - **Line-buffered reply parser**: Multi-line replies reassembled by a
//!   small state machine, never by pattern matching on whole buffers
//! - **Full delivery handshake**: EHLO, STARTTLS, AUTH, MAIL FROM, RCPT TO,
//!   DATA
//! - **TLS support**: Both implicit TLS (port 465) and opportunistic
//!   STARTTLS with a fresh EHLO after the upgrade
//! - **Authentication**: CRAM-MD5, LOGIN, PLAIN, and explicit XOAUTH2
//! - **Bounded pooling**: Connection reuse with a hard cap, FIFO waiters,
//!   and direct handoff on release
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailship_smtp::{Address, Command, SmtpConfig, SmtpConnection};
//!
//! #[tokio::main]
//! async fn main() -> mailship_smtp::Result<()> {
//!     let config = SmtpConfig::builder("smtp.example.com")
//!         .port(587)
//!         .ehlo_domain("client.example.com")
//!         .build();
//!
//!     // Connect, EHLO, STARTTLS when offered, authenticate.
//!     let mut conn = SmtpConnection::establish(&config).await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = Address::new("recipient@example.com")?;
//!
//!     conn.command(Command::MailFrom { from }, &[250]).await?;
//!     conn.command(Command::RcptTo { to }, &[250, 251]).await?;
//!     conn.command(Command::Data, &[354]).await?;
//!     conn.send_message("Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!
//!     conn.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanism selection and dialogues
//! - [`command`]: SMTP command builders
//! - [`config`]: Server, credential, and pool configuration
//! - [`connection`]: Connection factory, command engine, TLS upgrade
//! - [`parser`]: Reply accumulator
//! - [`pool`]: Bounded connection pool
//! - [`types`]: Core SMTP types (addresses, capabilities, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod parser;
pub mod pool;
pub mod types;

pub use auth::AuthState;
pub use command::Command;
pub use config::{Credentials, PoolConfig, SmtpConfig, SmtpConfigBuilder};
pub use connection::SmtpConnection;
pub use error::{Error, Result};
pub use pool::{Disposition, PoolStats, SmtpPool};
pub use types::{Address, AuthMechanism, Reply, ReplyCode, ServerCapabilities};
