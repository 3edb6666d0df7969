//! Outgoing message description and send receipts.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery priority, expressed through `X-Priority` and `Importance`
/// headers. Normal priority adds no headers at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Urgent, `X-Priority: 1`.
    High,
    /// The default.
    #[default]
    Normal,
    /// Bulk, `X-Priority: 5`.
    Low,
}

impl Priority {
    const fn x_priority(self) -> &'static str {
        match self {
            Self::High => "1",
            Self::Normal => "3",
            Self::Low => "5",
        }
    }

    const fn importance(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

/// An email to send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailOptions {
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses, listed in the message headers.
    pub cc: Vec<String>,
    /// BCC addresses. They receive the message but never appear in its
    /// headers.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// Additional headers, emitted in order after the standard ones.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Delivery priority.
    #[serde(default)]
    pub priority: Priority,
}

impl EmailOptions {
    /// Creates a new message description.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            text: text.into(),
            headers: Vec::new(),
            priority: Priority::Normal,
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Adds a custom header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the delivery priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Returns all recipients (to, cc, bcc) in envelope order.
    #[must_use]
    pub fn all_recipients(&self) -> Vec<&str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
            .collect()
    }

    /// Checks that the message can be sent at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] when the sender or the recipient
    /// list is missing, or when the subject or a custom header contains a
    /// line break. Header fields are written verbatim by the renderer, so
    /// a CR or LF in one would let its text masquerade as further headers.
    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(Error::InvalidMessage("sender address is required".into()));
        }
        if self.to.is_empty() {
            return Err(Error::InvalidMessage("no recipients specified".into()));
        }
        if has_line_break(&self.subject) {
            return Err(Error::InvalidMessage(
                "subject must not contain line breaks".into(),
            ));
        }
        for (name, value) in &self.headers {
            if has_line_break(name) || has_line_break(value) {
                return Err(Error::InvalidMessage(format!(
                    "header {name:?} must not contain line breaks"
                )));
            }
        }
        Ok(())
    }

    /// Builds the RFC 5322 message. BCC recipients are envelope-only and
    /// never written here.
    pub(crate) fn to_mime(&self, message_id: &str, date: &str) -> String {
        use std::fmt::Write;

        let mut message = String::new();
        let _ = write!(message, "Message-ID: {message_id}\r\n");
        let _ = write!(message, "Date: {date}\r\n");
        let _ = write!(message, "From: {}\r\n", self.from);
        if !self.to.is_empty() {
            let _ = write!(message, "To: {}\r\n", self.to.join(", "));
        }
        if !self.cc.is_empty() {
            let _ = write!(message, "Cc: {}\r\n", self.cc.join(", "));
        }
        let _ = write!(message, "Subject: {}\r\n", self.subject);
        if self.priority != Priority::Normal {
            let _ = write!(message, "X-Priority: {}\r\n", self.priority.x_priority());
            let _ = write!(message, "Importance: {}\r\n", self.priority.importance());
        }
        for (name, value) in &self.headers {
            let _ = write!(message, "{name}: {value}\r\n");
        }
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");
        message.push_str("\r\n");
        message.push_str(&self.text);
        message
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains('\r') || s.contains('\n')
}

/// Outcome of a successful send.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    /// The Message-ID assigned to the message.
    pub message_id: String,
    /// Name of the provider that performed the delivery.
    pub provider: String,
    /// Always true on a receipt; failures surface as errors instead.
    pub sent: bool,
    /// When the message was handed to the server.
    pub timestamp: DateTime<Utc>,
}
