//! SASL authentication dialogues: CRAM-MD5, LOGIN, PLAIN, XOAUTH2.

use crate::command::Command;
use crate::config::{Credentials, SmtpConfig};
use crate::connection::SmtpConnection;
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, ReplyCode, ServerCapabilities};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

/// Progress of the AUTH dialogue on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No AUTH was attempted, either because no credentials are configured
    /// or because none are needed.
    Unauthenticated,
    /// A 334 challenge is outstanding and a response is owed.
    ChallengeSent,
    /// The server accepted the credentials with 235.
    Authenticated,
    /// The server rejected the credentials.
    Failed,
}

/// Runs the AUTH dialogue appropriate for the configuration.
///
/// Without credentials this is a no-op. With credentials, the mechanism is
/// either the configured one or the strongest mutually supported one;
/// XOAUTH2 is used only when configured explicitly.
///
/// # Errors
///
/// Returns [`Error::Config`] when credentials cannot be used as configured,
/// [`Error::Authentication`] when the server rejects them, or transport
/// errors from the exchange.
pub async fn authenticate<S>(
    conn: &mut SmtpConnection<S>,
    config: &SmtpConfig,
) -> Result<AuthState>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some((mechanism, credentials)) = select_mechanism(config, conn.capabilities())? else {
        tracing::debug!("no credentials configured, skipping authentication");
        return Ok(AuthState::Unauthenticated);
    };

    tracing::debug!(mechanism = %mechanism, "authenticating");
    let outcome = match mechanism {
        AuthMechanism::CramMd5 => cram_md5(conn, credentials).await,
        AuthMechanism::Login => login(conn, credentials).await,
        AuthMechanism::Plain => plain(conn, credentials).await,
        AuthMechanism::XOAuth2 => xoauth2(conn, credentials).await,
    };
    match outcome {
        Ok(()) => {
            tracing::debug!(mechanism = %mechanism, "authentication succeeded");
            Ok(AuthState::Authenticated)
        }
        Err(err) => {
            tracing::debug!(state = ?AuthState::Failed, error = %err, "authentication failed");
            Err(err)
        }
    }
}

/// Picks the mechanism for this session, or `None` to skip AUTH entirely.
///
/// A configured `auth_method` always wins, even when the server does not
/// advertise it; some servers accept mechanisms they hide. Automatic
/// selection walks [`AuthMechanism::PRIORITY`] against the advertised list
/// and considers password credentials only.
fn select_mechanism<'a>(
    config: &'a SmtpConfig,
    capabilities: &ServerCapabilities,
) -> Result<Option<(AuthMechanism, &'a Credentials)>> {
    let Some(credentials) = config.credentials.as_ref() else {
        return Ok(None);
    };
    if credentials.username.is_empty() {
        return Ok(None);
    }

    let advertised = capabilities.auth_mechanisms();

    if let Some(forced) = config.auth_method {
        if !advertised.contains(&forced) {
            tracing::warn!(
                mechanism = %forced,
                "configured AUTH mechanism is not advertised by the server"
            );
        }
        return Ok(Some((forced, credentials)));
    }

    if credentials.password.is_none() {
        let reason = if credentials.oauth2_token.is_some() {
            "OAuth2 tokens are only used when auth_method is XOAUTH2"
        } else {
            "credentials configured without a password"
        };
        return Err(Error::Config(reason.to_string()));
    }
    if !capabilities.supports("AUTH") {
        return Err(Error::Config(
            "credentials configured but the server advertises no AUTH support".to_string(),
        ));
    }

    AuthMechanism::PRIORITY
        .iter()
        .copied()
        .find(|mechanism| advertised.contains(mechanism))
        .map(|mechanism| (mechanism, credentials))
        .map_or_else(
            || {
                Err(Error::Config(format!(
                    "no mutually supported AUTH mechanism (server offers {:?})",
                    capabilities.get("AUTH").unwrap_or_default()
                )))
            },
            |selected| Ok(Some(selected)),
        )
}

async fn plain<S>(conn: &mut SmtpConnection<S>, credentials: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let password = required_password(credentials, AuthMechanism::Plain)?;
    let initial = plain_initial(&credentials.username, password);
    conn.command(
        Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(initial),
        },
        &[235],
    )
    .await
    .map_err(auth_error)?;
    Ok(())
}

async fn login<S>(conn: &mut SmtpConnection<S>, credentials: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let password = required_password(credentials, AuthMechanism::Login)?;
    conn.command(
        Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        },
        &[334],
    )
    .await
    .map_err(auth_error)?;
    tracing::trace!(state = ?AuthState::ChallengeSent, "username prompt received");
    conn.command(
        Command::Continuation(STANDARD.encode(&credentials.username)),
        &[334],
    )
    .await
    .map_err(auth_error)?;
    conn.command(Command::Continuation(STANDARD.encode(password)), &[235])
        .await
        .map_err(auth_error)?;
    Ok(())
}

async fn cram_md5<S>(conn: &mut SmtpConnection<S>, credentials: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let password = required_password(credentials, AuthMechanism::CramMd5)?;
    let reply = conn
        .command(
            Command::Auth {
                mechanism: AuthMechanism::CramMd5,
                initial_response: None,
            },
            &[334],
        )
        .await
        .map_err(auth_error)?;
    tracing::trace!(state = ?AuthState::ChallengeSent, "challenge received");
    let challenge = STANDARD
        .decode(reply.first_line().trim())
        .map_err(|_| Error::Protocol("malformed CRAM-MD5 challenge".to_string()))?;
    let response = cram_md5_response(&credentials.username, password, &challenge)?;
    conn.command(Command::Continuation(STANDARD.encode(response)), &[235])
        .await
        .map_err(auth_error)?;
    Ok(())
}

async fn xoauth2<S>(conn: &mut SmtpConnection<S>, credentials: &Credentials) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let token = credentials.oauth2_token.as_deref().ok_or_else(|| {
        Error::Config("XOAUTH2 requires an OAuth2 access token".to_string())
    })?;
    let initial = xoauth2_initial(&credentials.username, token);
    let reply = conn
        .command(
            Command::Auth {
                mechanism: AuthMechanism::XOAuth2,
                initial_response: Some(initial),
            },
            &[235, 334],
        )
        .await
        .map_err(auth_error)?;
    if reply.code != ReplyCode::AUTH_CONTINUE {
        return Ok(());
    }

    // A 334 here is not a challenge but a base64 JSON error document. An
    // empty continuation line elicits the server's final verdict.
    tracing::trace!(state = ?AuthState::ChallengeSent, "error document received");
    let detail = decode_xoauth2_error(reply.first_line());
    match conn.command(Command::Continuation(String::new()), &[235]).await {
        Ok(_) => Ok(()),
        Err(Error::UnexpectedReply { reply, .. }) => {
            let message = match detail {
                Some(detail) => format!("{} ({detail})", reply.message_text()),
                None => reply.message_text(),
            };
            Err(Error::Authentication {
                code: reply.code.as_u16(),
                message,
            })
        }
        Err(other) => Err(other),
    }
}

/// Converts a reply-code mismatch during an AUTH dialogue into an
/// authentication error so callers can tell bad credentials apart from
/// protocol failures.
fn auth_error(err: Error) -> Error {
    match err {
        Error::UnexpectedReply { reply, .. } => Error::Authentication {
            code: reply.code.as_u16(),
            message: reply.message_text(),
        },
        other => other,
    }
}

fn required_password(credentials: &Credentials, mechanism: AuthMechanism) -> Result<&str> {
    credentials.password.as_deref().ok_or_else(|| {
        Error::Config(format!("{mechanism} authentication requires a password"))
    })
}

/// `\0username\0password`, before base64.
fn plain_initial(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// `user=<u>^Aauth=Bearer <token>^A^A`, before base64.
fn xoauth2_initial(username: &str, token: &str) -> String {
    STANDARD.encode(format!("user={username}\x01auth=Bearer {token}\x01\x01"))
}

/// RFC 2195 response: the username, a space, and the lowercase hex HMAC-MD5
/// digest of the decoded challenge keyed by the password.
fn cram_md5_response(username: &str, password: &str, challenge: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Md5>::new_from_slice(password.as_bytes())
        .map_err(|_| Error::Protocol("HMAC-MD5 rejected the password as key".to_string()))?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();
    Ok(format!("{username} {}", hex::encode(digest)))
}

#[derive(Debug, Deserialize)]
struct XOAuth2ErrorPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    schemes: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Decodes the base64 JSON document some servers attach to an XOAUTH2 334.
fn decode_xoauth2_error(line: &str) -> Option<String> {
    let raw = STANDARD.decode(line.trim()).ok()?;
    let payload: XOAuth2ErrorPayload = serde_json::from_slice(&raw).ok()?;
    let mut parts = Vec::new();
    if let Some(status) = payload.status {
        parts.push(format!("status {status}"));
    }
    if let Some(schemes) = payload.schemes {
        parts.push(format!("schemes {schemes}"));
    }
    if let Some(scope) = payload.scope {
        parts.push(format!("scope {scope}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
