//! # mailship
//!
//! Transactional email delivery over SMTP: a pooled provider with DKIM
//! signing, built on [`mailship_smtp`].
//!
//! ## Features
//!
//! - **Simple surface**: Build an [`EmailOptions`], call
//!   [`SmtpProvider::send_email`], get a [`SendReceipt`]
//! - **Connection pooling**: Transactions reuse authenticated connections
//!   up to a hard cap
//! - **DKIM signing**: `rsa-sha256` with relaxed/relaxed canonicalization,
//!   best-effort so a bad key never blocks delivery
//! - **No hidden retries**: Every failure surfaces exactly once; retry
//!   policy stays with the caller
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailship::{Credentials, EmailOptions, SmtpConfig, SmtpProvider};
//!
//! #[tokio::main]
//! async fn main() -> mailship::Result<()> {
//!     let config = SmtpConfig::builder("smtp.example.com")
//!         .port(587)
//!         .credentials(Credentials::password("mailer", "secret"))
//!         .build();
//!
//!     let provider = SmtpProvider::new(config);
//!     provider.initialize()?;
//!
//!     let email = EmailOptions::new(
//!         "sender@example.com",
//!         "Welcome aboard",
//!         "Thanks for signing up!\r\n",
//!     )
//!     .to("recipient@example.com");
//!
//!     let receipt = provider.send_email(&email).await?;
//!     println!("sent {}", receipt.message_id);
//!
//!     provider.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`dkim`]: DKIM configuration and signing
//! - [`options`]: Message description and send receipts
//! - [`provider`]: The SMTP provider

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod dkim;
mod error;
pub mod options;
pub mod provider;

pub use dkim::{DkimConfig, DkimSigner};
pub use error::{Error, Result};
pub use options::{EmailOptions, Priority, SendReceipt};
pub use provider::SmtpProvider;

pub use mailship_smtp::{AuthMechanism, Credentials, SmtpConfig, SmtpConfigBuilder};
