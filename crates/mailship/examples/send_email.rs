#![allow(clippy::expect_used, clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: Send a message through a real SMTP server
//!
//! Reads connection details from the environment, sends a plain-text
//! message, and prints the receipt. Works with any submission endpoint
//! (port 587 with STARTTLS, or 465 with implicit TLS).
//!
//! ## Running
//!
//! ```bash
//! export SMTP_HOST="smtp.example.com"
//! export SMTP_PORT="587"
//! export SMTP_USER="sender@example.com"
//! export SMTP_PASS="app-password"
//! export MAIL_TO="recipient@example.com"
//! cargo run --package mailship --example send_email
//! ```
//!
//! Set `RUST_LOG=mailship=debug,mailship_smtp=trace` to watch the
//! SMTP dialogue.

use mailship::{Credentials, EmailOptions, SmtpConfig, SmtpProvider};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = env::var("SMTP_HOST").expect("SMTP_HOST environment variable not set");
    let port: u16 = env::var("SMTP_PORT")
        .unwrap_or_else(|_| "587".to_string())
        .parse()?;
    let user = env::var("SMTP_USER").expect("SMTP_USER environment variable not set");
    let pass = env::var("SMTP_PASS").expect("SMTP_PASS environment variable not set");
    let to = env::var("MAIL_TO").expect("MAIL_TO environment variable not set");

    println!("mailship - SMTP send test");
    println!("=========================\n");

    let config = SmtpConfig::builder(&host)
        .port(port)
        .secure(port == 465)
        .credentials(Credentials::password(&user, &pass))
        .build();

    let provider = SmtpProvider::new(config);
    provider.initialize()?;
    println!("Connecting to {}:{}...", host, port);

    if !provider.is_available().await {
        eprintln!("Server is not reachable, check SMTP_HOST/SMTP_PORT");
        std::process::exit(1);
    }
    println!("✓ Server reachable");

    let options = EmailOptions::new(
        &user,
        "mailship example",
        "Hello from the mailship send_email example.\r\n",
    )
    .to(&to);

    println!("Sending to {}...", to);
    let receipt = provider.send_email(&options).await?;
    println!("✓ Sent");
    println!("\n  message id: {}", receipt.message_id);
    println!("  provider:   {}", receipt.provider);
    println!("  timestamp:  {}", receipt.timestamp.to_rfc2822());

    provider.shutdown().await;
    Ok(())
}
