//! Incremental SMTP reply parser.
//!
//! SMTP replies can be single-line or multi-line:
//! - Single: `250 OK\r\n`
//! - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
//!
//! A `-` after the code continues the group; a space (or a bare code)
//! terminates it. The accumulator consumes complete CRLF lines from a byte
//! buffer and reports [`ReplyProgress::Complete`] only on the terminal line,
//! so partial lines and partial groups never produce a reply.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};
use bytes::BytesMut;

/// Longest reply line accepted before the stream is considered corrupt.
const MAX_LINE_LENGTH: usize = 8192;

/// Progress of decoding one reply group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyProgress {
    /// The terminal line has not arrived yet.
    ExpectingMore,
    /// A full reply group was decoded.
    Complete(Reply),
}

/// Incremental decoder for one SMTP reply group at a time.
///
/// Feed it the read buffer after every socket read; it consumes the bytes
/// of complete lines and leaves anything after the terminal CRLF untouched.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    code: Option<ReplyCode>,
    lines: Vec<String>,
}

impl ReplyAccumulator {
    /// Creates an accumulator with no buffered lines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes complete lines from `buf` and advances the state machine.
    ///
    /// On [`ReplyProgress::Complete`] the accumulator is reset and ready for
    /// the next reply group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed lines: missing or
    /// non-numeric code, an invalid separator, a code change mid-group, or
    /// a line exceeding the length bound.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<ReplyProgress> {
        while let Some(pos) = find_crlf(buf) {
            let line_bytes = buf.split_to(pos + 2);
            let line = String::from_utf8_lossy(&line_bytes[..pos]).into_owned();
            if self.push_line(&line)? {
                let code = self.code.take().unwrap_or(ReplyCode::new(0));
                let message = std::mem::take(&mut self.lines);
                return Ok(ReplyProgress::Complete(Reply::new(code, message)));
            }
        }

        if buf.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("reply line too long".to_string()));
        }

        Ok(ReplyProgress::ExpectingMore)
    }

    /// Returns true if lines of an unfinished group are buffered.
    #[must_use]
    pub fn is_mid_reply(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Records one line; returns true when it terminates the group.
    fn push_line(&mut self, line: &str) -> Result<bool> {
        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("reply line too long".to_string()));
        }
        if line.len() < 3 {
            return Err(Error::Protocol(format!("reply line too short: {line}")));
        }

        let code_str = &line[..3];
        let code: u16 = code_str
            .parse()
            .map_err(|_| Error::Protocol(format!("invalid reply code: {line}")))?;
        let code = ReplyCode::new(code);

        match self.code {
            None => self.code = Some(code),
            Some(first) if first != code => {
                return Err(Error::Protocol(format!(
                    "reply code changed mid-group: {first} then {code}"
                )));
            }
            Some(_) => {}
        }

        let (terminal, text) = match line.as_bytes().get(3) {
            // Bare "CCC" terminates the group with empty text
            None => (true, ""),
            Some(b' ') => (true, line.get(4..).unwrap_or("")),
            Some(b'-') => (false, line.get(4..).unwrap_or("")),
            Some(_) => {
                return Err(Error::Protocol(format!("malformed reply line: {line}")));
            }
        };

        self.lines.push(text.to_string());
        Ok(terminal)
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn feed_all(input: &[u8]) -> Result<ReplyProgress> {
        let mut buf = BytesMut::from(input);
        ReplyAccumulator::new().feed(&mut buf)
    }

    fn complete(input: &[u8]) -> Reply {
        match feed_all(input).unwrap() {
            ReplyProgress::Complete(reply) => reply,
            ReplyProgress::ExpectingMore => panic!("expected a complete reply"),
        }
    }

    #[test]
    fn single_line_reply() {
        let reply = complete(b"250 OK\r\n");
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn greeting_reply() {
        let reply = complete(b"220 smtp.example.com ESMTP ready\r\n");
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.message, vec!["smtp.example.com ESMTP ready"]);
    }

    #[test]
    fn multi_line_reply_completes_only_at_terminal() {
        let mut buf = BytesMut::from(&b"250-SIZE 10240\r\n250-AUTH LOGIN PLAIN\r\n"[..]);
        let mut acc = ReplyAccumulator::new();
        assert_eq!(acc.feed(&mut buf).unwrap(), ReplyProgress::ExpectingMore);
        assert!(acc.is_mid_reply());

        buf.extend_from_slice(b"250 STARTTLS\r\n");
        let ReplyProgress::Complete(reply) = acc.feed(&mut buf).unwrap() else {
            panic!("terminal line must complete the group");
        };
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.message,
            vec!["SIZE 10240", "AUTH LOGIN PLAIN", "STARTTLS"]
        );
        assert!(!acc.is_mid_reply());
    }

    #[test]
    fn partial_line_stays_buffered() {
        let mut buf = BytesMut::from(&b"250 O"[..]);
        let mut acc = ReplyAccumulator::new();
        assert_eq!(acc.feed(&mut buf).unwrap(), ReplyProgress::ExpectingMore);
        assert_eq!(&buf[..], b"250 O");

        buf.extend_from_slice(b"K\r\n");
        let ReplyProgress::Complete(reply) = acc.feed(&mut buf).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(reply.message, vec!["OK"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_split_across_feeds() {
        let mut buf = BytesMut::from(&b"250 OK\r"[..]);
        let mut acc = ReplyAccumulator::new();
        assert_eq!(acc.feed(&mut buf).unwrap(), ReplyProgress::ExpectingMore);

        buf.extend_from_slice(b"\n");
        assert!(matches!(
            acc.feed(&mut buf).unwrap(),
            ReplyProgress::Complete(_)
        ));
    }

    #[test]
    fn bare_code_line_is_terminal() {
        let reply = complete(b"250\r\n");
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn code_with_separator_and_no_text() {
        let reply = complete(b"354 \r\n");
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn trailing_bytes_left_in_buffer() {
        let mut buf = BytesMut::from(&b"250 first\r\n221 second\r\n"[..]);
        let mut acc = ReplyAccumulator::new();
        let ReplyProgress::Complete(first) = acc.feed(&mut buf).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(first.code.as_u16(), 250);
        assert_eq!(&buf[..], b"221 second\r\n");

        let ReplyProgress::Complete(second) = acc.feed(&mut buf).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(second.code.as_u16(), 221);
    }

    #[test]
    fn rejects_short_line() {
        assert!(feed_all(b"25\r\n").is_err());
    }

    #[test]
    fn rejects_non_numeric_code() {
        assert!(feed_all(b"ABC OK\r\n").is_err());
    }

    #[test]
    fn rejects_invalid_separator() {
        assert!(feed_all(b"250+OK\r\n").is_err());
    }

    #[test]
    fn rejects_code_change_mid_group() {
        assert!(feed_all(b"250-foo\r\n550 bar\r\n").is_err());
    }

    #[test]
    fn rejects_unterminated_oversized_line() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_LENGTH + 1]);
        assert!(ReplyAccumulator::new().feed(&mut buf).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Decoding must not depend on how the bytes were chunked.
            #[test]
            fn chunking_never_changes_the_reply(split_points in proptest::collection::vec(1usize..52, 0..6)) {
                let wire = b"250-SIZE 10240\r\n250-AUTH LOGIN PLAIN\r\n250 STARTTLS\r\n";

                let mut whole = BytesMut::from(&wire[..]);
                let ReplyProgress::Complete(expected) =
                    ReplyAccumulator::new().feed(&mut whole).unwrap()
                else {
                    unreachable!("full input always completes");
                };

                let mut cuts: Vec<usize> = split_points;
                cuts.sort_unstable();
                cuts.dedup();

                let mut acc = ReplyAccumulator::new();
                let mut buf = BytesMut::new();
                let mut result = None;
                let mut start = 0;
                for cut in cuts.into_iter().chain(std::iter::once(wire.len())) {
                    if cut <= start {
                        continue;
                    }
                    buf.extend_from_slice(&wire[start..cut]);
                    start = cut;
                    if let ReplyProgress::Complete(reply) = acc.feed(&mut buf).unwrap() {
                        result = Some(reply);
                    }
                }

                prop_assert_eq!(result.as_ref(), Some(&expected));
            }
        }
    }
}
