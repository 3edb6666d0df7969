//! EHLO capability announcement types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMechanism {
    /// CRAM-MD5 - challenge-response digest
    CramMd5,
    /// LOGIN - two-step plaintext
    Login,
    /// PLAIN - single-step plaintext
    Plain,
    /// `XOAUTH2` - `OAuth2` bearer token (Google/Microsoft)
    XOAuth2,
}

impl AuthMechanism {
    /// Automatic selection order when no mechanism is configured.
    ///
    /// `XOAUTH2` is absent on purpose: it needs a bearer token, which cannot
    /// be discovered from capabilities, so it is only used when configured
    /// explicitly.
    pub const PRIORITY: [Self; 3] = [Self::CramMd5, Self::Login, Self::Plain];

    /// Parses a mechanism name from an AUTH capability argument.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CRAM-MD5" => Some(Self::CramMd5),
            "LOGIN" => Some(Self::Login),
            "PLAIN" => Some(Self::Plain),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CramMd5 => "CRAM-MD5",
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities advertised by an EHLO reply, keyword to argument list.
///
/// Rebuilt from every EHLO; a TLS upgrade invalidates whatever the server
/// announced beforehand, so these are never cached across an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    extensions: HashMap<String, Vec<String>>,
}

impl ServerCapabilities {
    /// Parses capability lines (one keyword plus arguments per line).
    ///
    /// Keywords are normalized to uppercase; arguments are kept verbatim.
    /// Blank lines are skipped.
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut extensions = HashMap::new();
        for line in lines {
            let mut parts = line.as_ref().split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: Vec<String> = parts.map(str::to_string).collect();
            extensions.insert(keyword.to_uppercase(), args);
        }
        Self { extensions }
    }

    /// Returns the arguments for a keyword, if advertised.
    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&[String]> {
        self.extensions
            .get(&keyword.to_uppercase())
            .map(Vec::as_slice)
    }

    /// Returns true if the keyword was advertised.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.extensions.contains_key(&keyword.to_uppercase())
    }

    /// Returns true if the server advertised STARTTLS.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// Returns the advertised SASL mechanisms, unknown names skipped.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.get("AUTH").map_or_else(Vec::new, |args| {
            args.iter().filter_map(|m| AuthMechanism::parse(m)).collect()
        })
    }

    /// Returns the advertised SIZE limit, if present and numeric.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.get("SIZE")?.first()?.parse().ok()
    }

    /// Returns true if no capabilities were advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
