//! DKIM message signing.
//!
//! Messages are signed with `rsa-sha256` using relaxed/relaxed
//! canonicalization (RFC 6376). Signing is strictly best-effort: any
//! failure leaves the message untouched so delivery is never blocked by a
//! bad key or an unparsable message.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Headers covered by the signature, in `h=` tag order.
const SIGNED_HEADERS: [&str; 4] = ["from", "to", "subject", "date"];

/// DKIM signing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkimConfig {
    /// Signing domain, the `d=` tag. Must match the verified From domain
    /// for DMARC alignment.
    pub domain: String,
    /// Selector under `_domainkey`, the `s=` tag.
    pub selector: String,
    /// RSA private key in PKCS#1 or PKCS#8 PEM form.
    pub private_key_pem: String,
}

/// Signs outgoing messages by prepending a `DKIM-Signature` header.
#[derive(Clone)]
pub struct DkimSigner {
    domain: String,
    selector: String,
    key: SigningKey<Sha256>,
}

impl fmt::Debug for DkimSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimSigner")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl DkimSigner {
    /// Builds a signer from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dkim`] when the domain or selector is empty or the
    /// private key cannot be parsed.
    pub fn new(config: &DkimConfig) -> Result<Self> {
        if config.domain.is_empty() {
            return Err(Error::Dkim("signing domain is required".into()));
        }
        if config.selector.is_empty() {
            return Err(Error::Dkim("selector is required".into()));
        }
        let key = parse_private_key(&config.private_key_pem)?;
        Ok(Self {
            domain: config.domain.clone(),
            selector: config.selector.clone(),
            key: SigningKey::new(key),
        })
    }

    /// Signs `message` and returns it with a `DKIM-Signature` header
    /// prepended. The message itself is not modified.
    ///
    /// When the message cannot be signed the original text is returned
    /// unchanged and the reason is logged.
    #[must_use]
    pub fn sign(&self, message: &str) -> String {
        match self.try_sign(message, Utc::now().timestamp()) {
            Ok(signed) => signed,
            Err(err) => {
                tracing::warn!(error = %err, "DKIM signing failed, sending unsigned");
                message.to_string()
            }
        }
    }

    fn try_sign(&self, message: &str, timestamp: i64) -> Result<String> {
        let (headers, body) = split_message(message)
            .ok_or_else(|| Error::Dkim("message has no header/body separator".into()))?;

        let body_hash = STANDARD.encode(Sha256::digest(relax_body(body)));

        let signed = select_signed_headers(headers);
        if !signed.iter().any(|(name, _)| *name == "from") {
            return Err(Error::Dkim("message has no From header to sign".into()));
        }
        let header_names = signed
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(":");

        let unsigned_header = format!(
            "v=1; a=rsa-sha256; c=relaxed/relaxed; d={}; s={}; t={timestamp}; \
             bh={body_hash}; h={header_names}; b=",
            self.domain, self.selector
        );

        // The DKIM-Signature header is hashed last, with b= empty and no
        // trailing CRLF.
        let mut data = String::new();
        for (name, value) in &signed {
            data.push_str(&relax_header(name, value));
            data.push_str("\r\n");
        }
        data.push_str(&relax_header("DKIM-Signature", &unsigned_header));

        let signature = self
            .key
            .try_sign(data.as_bytes())
            .map_err(|err| Error::Dkim(format!("signing failed: {err}")))?;
        let encoded = STANDARD.encode(signature.to_bytes());

        Ok(format!("DKIM-Signature: {unsigned_header}{encoded}\r\n{message}"))
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|err| Error::Dkim(format!("invalid private key: {err}")))
}

/// Splits a message at the first blank line into (headers, body).
fn split_message(message: &str) -> Option<(&str, &str)> {
    if let Some(pos) = message.find("\r\n\r\n") {
        return Some((&message[..pos], &message[pos + 4..]));
    }
    message.find("\n\n").map(|pos| (&message[..pos], &message[pos + 2..]))
}

/// Parses a header block into (name, value) pairs, unfolding continuation
/// lines into the preceding value.
fn parse_headers(headers: &str) -> Vec<(String, String)> {
    let mut parsed: Vec<(String, String)> = Vec::new();
    for line in headers.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = parsed.last_mut() {
                value.push_str(line);
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            parsed.push((name.to_string(), value.to_string()));
        }
    }
    parsed
}

/// Picks the headers to sign. Duplicates resolve to the last occurrence,
/// matching the bottom-up selection verifiers use.
fn select_signed_headers(headers: &str) -> Vec<(&'static str, String)> {
    let parsed = parse_headers(headers);
    let mut selected = Vec::new();
    for name in SIGNED_HEADERS {
        let found = parsed
            .iter()
            .rev()
            .find(|(candidate, _)| candidate.trim().eq_ignore_ascii_case(name));
        if let Some((_, value)) = found {
            selected.push((name, value.clone()));
        }
    }
    selected
}

/// Reduces each run of spaces and tabs to a single space.
fn collapse_wsp(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_wsp = false;
    for ch in input.chars() {
        if ch == ' ' || ch == '\t' {
            if !in_wsp {
                out.push(' ');
            }
            in_wsp = true;
        } else {
            out.push(ch);
            in_wsp = false;
        }
    }
    out
}

/// Relaxed body canonicalization: collapse interior whitespace, strip
/// trailing whitespace per line, drop trailing empty lines. An empty body
/// canonicalizes to the empty string.
fn relax_body(body: &str) -> String {
    let mut lines: Vec<String> = body
        .split('\n')
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            collapse_wsp(line).trim_end().to_string()
        })
        .collect();
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Relaxed header canonicalization: lowercase name, collapse and trim the
/// unfolded value, no whitespace around the colon.
fn relax_header(name: &str, value: &str) -> String {
    format!(
        "{}:{}",
        name.trim().to_ascii_lowercase(),
        collapse_wsp(value).trim()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;

    const PKCS8_KEY: &str = include_str!("../tests/keys/dkim_key.pem");
    const PKCS1_KEY: &str = include_str!("../tests/keys/dkim_key_pkcs1.pem");

    fn config() -> DkimConfig {
        DkimConfig {
            domain: "example.com".to_string(),
            selector: "mail".to_string(),
            private_key_pem: PKCS8_KEY.to_string(),
        }
    }

    mod canonicalization {
        use super::*;

        #[test]
        fn relaxed_body_vector() {
            assert_eq!(relax_body(" C \r\nD \t E\r\n\r\n\r\n"), " C\r\nD E\r\n");
        }

        #[test]
        fn relaxed_header_vector() {
            let parsed = parse_headers("A: X\r\nB : Y\t\r\n\tZ  \r\n");
            assert_eq!(relax_header(&parsed[0].0, &parsed[0].1), "a:X");
            assert_eq!(relax_header(&parsed[1].0, &parsed[1].1), "b:Y Z");
        }

        #[test]
        fn empty_body_hashes_to_known_value() {
            assert_eq!(relax_body(""), "");
            assert_eq!(
                STANDARD.encode(Sha256::digest(relax_body(""))),
                "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
            );
        }

        #[test]
        fn body_of_only_blank_lines_is_empty() {
            assert_eq!(relax_body("\r\n\r\n"), "");
        }

        #[test]
        fn duplicate_header_resolves_to_last_occurrence() {
            let selected =
                select_signed_headers("From: first@example.com\r\nFrom: second@example.com");
            assert_eq!(selected.len(), 1);
            assert_eq!(selected[0].1, " second@example.com");
        }
    }

    mod keys {
        use super::*;

        #[test]
        fn accepts_pkcs8_and_pkcs1_keys() {
            assert!(DkimSigner::new(&config()).is_ok());

            let mut pkcs1 = config();
            pkcs1.private_key_pem = PKCS1_KEY.to_string();
            assert!(DkimSigner::new(&pkcs1).is_ok());
        }

        #[test]
        fn rejects_garbage_key() {
            let mut bad = config();
            bad.private_key_pem = "not a key".to_string();
            assert!(DkimSigner::new(&bad).is_err());
        }

        #[test]
        fn rejects_empty_domain_or_selector() {
            let mut bad = config();
            bad.domain = String::new();
            assert!(DkimSigner::new(&bad).is_err());

            let mut bad = config();
            bad.selector = String::new();
            assert!(DkimSigner::new(&bad).is_err());
        }

        #[test]
        fn debug_output_redacts_the_key() {
            let signer = DkimSigner::new(&config()).unwrap();
            let rendered = format!("{signer:?}");
            assert!(rendered.contains("example.com"));
            assert!(!rendered.contains("PRIVATE KEY"));
        }
    }

    mod signing {
        use super::*;

        const MESSAGE: &str = "From: a@example.com\r\nTo: b@example.com\r\n\
                               Subject: Hi\r\nDate: Thu, 21 Aug 2025 10:00:00 +0000\r\n\
                               \r\nHello\r\n";

        #[test]
        fn signs_and_verifies() {
            let signer = DkimSigner::new(&config()).unwrap();
            let signed = signer.try_sign(MESSAGE, 1700000000).unwrap();

            let body_hash = STANDARD.encode(Sha256::digest("Hello\r\n"));
            let tags = format!(
                "v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com; s=mail; \
                 t=1700000000; bh={body_hash}; h=from:to:subject:date; b="
            );
            assert!(signed.starts_with(&format!("DKIM-Signature: {tags}")));
            assert!(signed.ends_with(MESSAGE));

            let header_line = signed.lines().next().unwrap();
            let encoded = header_line.rsplit_once("; b=").unwrap().1;

            // Rebuild the hashed data by hand and check the signature
            // against the public key.
            let data = format!(
                "from:a@example.com\r\nto:b@example.com\r\nsubject:Hi\r\n\
                 date:Thu, 21 Aug 2025 10:00:00 +0000\r\ndkim-signature:{tags}"
            );
            let key = RsaPrivateKey::from_pkcs8_pem(PKCS8_KEY).unwrap();
            let verifying = VerifyingKey::<Sha256>::new(key.to_public_key());
            let signature =
                Signature::try_from(STANDARD.decode(encoded).unwrap().as_slice()).unwrap();
            verifying.verify(data.as_bytes(), &signature).unwrap();
        }

        #[test]
        fn message_without_separator_is_returned_unchanged() {
            let signer = DkimSigner::new(&config()).unwrap();
            let message = "From: a@example.com\r\nSubject: no body";
            assert_eq!(signer.sign(message), message);
        }

        #[test]
        fn message_without_from_is_returned_unchanged() {
            let signer = DkimSigner::new(&config()).unwrap();
            let message = "To: b@example.com\r\n\r\nHello\r\n";
            assert_eq!(signer.sign(message), message);
        }

        #[test]
        fn missing_optional_headers_shrink_the_h_tag() {
            let signer = DkimSigner::new(&config()).unwrap();
            let message = "From: a@example.com\r\n\r\nHello\r\n";
            let signed = signer.try_sign(message, 1700000000).unwrap();
            assert!(signed.contains("h=from;"));
        }

        #[test]
        fn lf_only_messages_are_signed() {
            let signer = DkimSigner::new(&config()).unwrap();
            let message = "From: a@example.com\nSubject: Hi\n\nHello\n";
            let signed = signer.try_sign(message, 1700000000).unwrap();
            assert!(signed.starts_with("DKIM-Signature: "));
            assert!(signed.contains("h=from:subject;"));
        }
    }
}
