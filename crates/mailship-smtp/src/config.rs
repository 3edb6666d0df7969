//! Client configuration types.

use crate::error::{Error, Result};
use crate::types::AuthMechanism;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Returns the default port: 25 plaintext, 465 for implicit TLS.
#[must_use]
pub const fn default_port(secure: bool) -> u16 {
    if secure { 465 } else { 25 }
}

/// Authentication credentials.
///
/// Password mechanisms (CRAM-MD5, LOGIN, PLAIN) need `password`; XOAUTH2
/// needs `oauth2_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: Option<String>,
    /// `OAuth2` bearer token for XOAUTH2.
    pub oauth2_token: Option<String>,
}

impl Credentials {
    /// Creates username/password credentials.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            oauth2_token: None,
        }
    }

    /// Creates `OAuth2` bearer-token credentials.
    #[must_use]
    pub fn oauth2(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            oauth2_token: Some(token.into()),
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Whether connections are reused across sends. When false, every send
    /// dials a fresh connection and closes it afterwards.
    pub enabled: bool,
    /// Upper bound on open connections (idle plus in flight).
    pub max_connections: usize,
    /// How long an acquire may wait for a released connection.
    pub wait_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_connections: 5,
            wait_timeout: Duration::from_secs(30),
        }
    }
}

/// SMTP client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Implicit TLS from the first byte (port 465 style). When false, the
    /// client connects in plaintext and upgrades via STARTTLS when the
    /// server advertises it.
    pub secure: bool,
    /// Hostname announced in EHLO.
    pub ehlo_domain: String,
    /// Credentials; `None` skips authentication entirely.
    pub credentials: Option<Credentials>,
    /// Forces a mechanism instead of capability-based selection.
    pub auth_method: Option<AuthMechanism>,
    /// Verify the server certificate chain. Disabling accepts any
    /// certificate and is only suitable for test servers.
    pub reject_unauthorized: bool,
    /// Deadline for the whole connect-and-greet sequence, TLS included.
    pub connect_timeout: Duration,
    /// Deadline for each command's reply.
    pub command_timeout: Duration,
    /// Pooling behavior.
    pub pool: PoolConfig,
    /// Retry budget consumed by outer failover/round-robin wrappers.
    /// This client never retries on its own.
    pub retries: u32,
}

impl SmtpConfig {
    /// Creates a plaintext configuration on port 25 with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        SmtpConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SmtpConfigBuilder {
        SmtpConfigBuilder::new(host)
    }

    /// Checks the configuration for contradictions before any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host, a zero-sized pool, or
    /// credentials that cannot satisfy the configured mechanism.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.pool.enabled && self.pool.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                return Err(Error::Config("username must not be empty".to_string()));
            }
            match self.auth_method {
                Some(AuthMechanism::XOAuth2) if credentials.oauth2_token.is_none() => {
                    return Err(Error::Config(
                        "XOAUTH2 requires an oauth2 token".to_string(),
                    ));
                }
                Some(mech) if mech != AuthMechanism::XOAuth2 && credentials.password.is_none() => {
                    return Err(Error::Config(format!("{mech} requires a password")));
                }
                _ => {}
            }
        } else if self.auth_method.is_some() {
            return Err(Error::Config(
                "auth_method is set but no credentials were given".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`SmtpConfig`].
#[derive(Debug, Clone)]
pub struct SmtpConfigBuilder {
    host: String,
    port: Option<u16>,
    secure: bool,
    ehlo_domain: String,
    credentials: Option<Credentials>,
    auth_method: Option<AuthMechanism>,
    reject_unauthorized: bool,
    connect_timeout: Duration,
    command_timeout: Duration,
    pool: PoolConfig,
    retries: u32,
}

impl SmtpConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: false,
            ehlo_domain: "localhost".to_string(),
            credentials: None,
            auth_method: None,
            reject_unauthorized: true,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            pool: PoolConfig::default(),
            retries: 3,
        }
    }

    /// Sets the port. Defaults to 25, or 465 when secure.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables implicit TLS.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the hostname announced in EHLO.
    #[must_use]
    pub fn ehlo_domain(mut self, domain: impl Into<String>) -> Self {
        self.ehlo_domain = domain.into();
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Forces an authentication mechanism.
    #[must_use]
    pub const fn auth_method(mut self, mechanism: AuthMechanism) -> Self {
        self.auth_method = Some(mechanism);
        self
    }

    /// Controls server certificate verification.
    #[must_use]
    pub const fn reject_unauthorized(mut self, reject: bool) -> Self {
        self.reject_unauthorized = reject;
        self
    }

    /// Sets the connect-and-greet deadline.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-command reply deadline.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Enables or disables pooling.
    #[must_use]
    pub const fn pooling(mut self, enabled: bool) -> Self {
        self.pool.enabled = enabled;
        self
    }

    /// Sets the connection bound.
    #[must_use]
    pub const fn max_connections(mut self, max: usize) -> Self {
        self.pool.max_connections = max;
        self
    }

    /// Sets the acquire wait budget.
    #[must_use]
    pub const fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.pool.wait_timeout = timeout;
        self
    }

    /// Sets the retry budget advertised to outer wrappers.
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SmtpConfig {
        SmtpConfig {
            port: self.port.unwrap_or(default_port(self.secure)),
            host: self.host,
            secure: self.secure,
            ehlo_domain: self.ehlo_domain,
            credentials: self.credentials,
            auth_method: self.auth_method,
            reject_unauthorized: self.reject_unauthorized,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            pool: self.pool,
            retries: self.retries,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        assert_eq!(default_port(false), 25);
        assert_eq!(default_port(true), 465);
        assert_eq!(SmtpConfig::new("mail.example.com").port, 25);
        assert_eq!(
            SmtpConfig::builder("mail.example.com")
                .secure(true)
                .build()
                .port,
            465
        );
    }

    #[test]
    fn explicit_port_wins() {
        let config = SmtpConfig::builder("mail.example.com").port(587).build();
        assert_eq!(config.port, 587);
        assert!(!config.secure);
    }

    #[test]
    fn builder_round_trip() {
        let config = SmtpConfig::builder("mail.example.com")
            .port(587)
            .ehlo_domain("client.example.com")
            .credentials(Credentials::password("user", "secret"))
            .auth_method(AuthMechanism::Login)
            .reject_unauthorized(false)
            .connect_timeout(Duration::from_secs(5))
            .command_timeout(Duration::from_secs(10))
            .max_connections(2)
            .wait_timeout(Duration::from_millis(50))
            .retries(1)
            .build();

        assert_eq!(config.host, "mail.example.com");
        assert_eq!(config.ehlo_domain, "client.example.com");
        assert_eq!(config.auth_method, Some(AuthMechanism::Login));
        assert!(!config.reject_unauthorized);
        assert_eq!(config.pool.max_connections, 2);
        assert_eq!(config.pool.wait_timeout, Duration::from_millis(50));
        assert_eq!(config.retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_host() {
        assert!(SmtpConfig::new("").validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_pool() {
        let config = SmtpConfig::builder("h").max_connections(0).build();
        assert!(config.validate().is_err());

        // A zero bound is fine when pooling is off
        let config = SmtpConfig::builder("h")
            .pooling(false)
            .max_connections(0)
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_mechanism_without_matching_secret() {
        let config = SmtpConfig::builder("h")
            .credentials(Credentials::password("user", "pass"))
            .auth_method(AuthMechanism::XOAuth2)
            .build();
        assert!(config.validate().is_err());

        let config = SmtpConfig::builder("h")
            .credentials(Credentials::oauth2("user", "token"))
            .auth_method(AuthMechanism::CramMd5)
            .build();
        assert!(config.validate().is_err());

        let config = SmtpConfig::builder("h")
            .credentials(Credentials::oauth2("user", "token"))
            .auth_method(AuthMechanism::XOAuth2)
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_method_without_credentials() {
        let config = SmtpConfig::builder("h")
            .auth_method(AuthMechanism::Plain)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_username() {
        let config = SmtpConfig::builder("h")
            .credentials(Credentials::password("", "pass"))
            .build();
        assert!(config.validate().is_err());
    }
}
