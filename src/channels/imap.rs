//! Blocking IMAP client over TLS: just enough protocol for an unread sweep.
//!
//! Commands issued: `LOGIN`, `SELECT`, `SEARCH UNSEEN`, `FETCH <id> (RFC822)`,
//! `CLOSE`, `LOGOUT`. `FETCH RFC822` sets `\Seen` on the server, which is
//! what keeps a message from being returned by the next sweep.
//!
//! Everything here blocks; callers run it inside `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::ChannelError;

/// Socket read timeout for every IMAP exchange.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest message literal accepted from the server.
const MAX_LITERAL_BYTES: usize = 50 * 1024 * 1024;

/// Longest response line accepted from the server, CRLF included.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Something that can open an authenticated mailbox session.
pub trait MailSource: Send + Sync {
    /// Connect, log in and select the mailbox.
    fn open(&self) -> Result<Box<dyn MailSession>, ChannelError>;
}

/// An open, selected mailbox.
pub trait MailSession: Send {
    /// Ids of unread messages, in server order.
    fn search_unseen(&mut self) -> Result<Vec<String>, ChannelError>;

    /// Full RFC 822 bytes of one message.
    fn fetch_rfc822(&mut self, id: &str) -> Result<Vec<u8>, ChannelError>;

    /// Close the mailbox and log out. Safe to call more than once.
    fn close(&mut self) -> Result<(), ChannelError>;
}

// ── TLS mail source ─────────────────────────────────────────────────

/// IMAP-over-TLS mail source built from `MailConfig`.
pub struct ImapMailSource {
    config: MailConfig,
}

impl ImapMailSource {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

impl MailSource for ImapMailSource {
    fn open(&self) -> Result<Box<dyn MailSession>, ChannelError> {
        let cfg = &self.config;

        let tcp = TcpStream::connect((cfg.mail_host.as_str(), cfg.mail_port)).map_err(conn_err)?;
        tcp.set_read_timeout(Some(READ_TIMEOUT)).map_err(conn_err)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(cfg.mail_host.clone()).map_err(|e| {
            ChannelError::Connection {
                name: "email".into(),
                reason: format!("invalid server name {}: {e}", cfg.mail_host),
            }
        })?;
        let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(|e| {
            ChannelError::Connection {
                name: "email".into(),
                reason: format!("TLS setup failed: {e}"),
            }
        })?;
        let tls: TlsStream = rustls::StreamOwned::new(conn, tcp);

        let mut session = ImapSession::new(tls);
        session.read_greeting()?;
        session.login(&cfg.mail_user, cfg.mail_password.expose_secret())?;
        session.select(&cfg.mailbox)?;

        debug!(host = %cfg.mail_host, mailbox = %cfg.mailbox, "IMAP session opened");
        Ok(Box::new(session))
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Responses collected for one tagged command.
#[derive(Debug, Default)]
struct Response {
    /// Untagged and continuation lines, CRLF stripped.
    lines: Vec<String>,
    /// Literal payloads (`{n}` blocks) in arrival order.
    literals: Vec<Vec<u8>>,
}

/// IMAP session over any byte stream.
pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
    closed: bool,
    /// Set after an oversized response; the stream position is unknown.
    desynced: bool,
}

impl<S: Read + Write> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            next_tag: 1,
            closed: false,
            desynced: false,
        }
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Consume the server greeting (`* OK ...`).
    pub fn read_greeting(&mut self) -> Result<(), ChannelError> {
        let greeting = self.read_line()?;
        if greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(protocol_err(format!("unexpected greeting: {greeting}")))
        }
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<(), ChannelError> {
        let cmd = format!("LOGIN {} {}", quote(user), quote(password));
        self.command("LOGIN", &cmd).map_err(|e| match e {
            // Auth failures are connection failures for the poll cycle
            ChannelError::Protocol { reason, .. } => ChannelError::Connection {
                name: "email".into(),
                reason,
            },
            other => other,
        })?;
        Ok(())
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), ChannelError> {
        self.command("SELECT", &format!("SELECT {}", quote(mailbox)))?;
        Ok(())
    }

    /// Send one command and collect everything up to its tagged completion.
    fn command(&mut self, name: &str, cmd: &str) -> Result<Response, ChannelError> {
        if self.desynced {
            return Err(ChannelError::Connection {
                name: "email".into(),
                reason: format!("{name} not sent: session out of sync"),
            });
        }

        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let writer = self.stream.get_mut();
        writer
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())
            .map_err(conn_err)?;
        writer.flush().map_err(conn_err)?;

        let tag_prefix = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;

            if let Some(status) = line.strip_prefix(&tag_prefix) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(protocol_err(format!("{name} failed: {status}")));
            }

            if let Some(len) = literal_len(&line) {
                if len > MAX_LITERAL_BYTES {
                    self.desynced = true;
                    return Err(protocol_err(format!(
                        "{name} literal of {len} bytes exceeds {MAX_LITERAL_BYTES}"
                    )));
                }
                let mut buf = vec![0u8; len];
                self.stream.read_exact(&mut buf).map_err(conn_err)?;
                response.literals.push(buf);
            }
            response.lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, ChannelError> {
        let mut buf = Vec::new();
        let limit = (MAX_LINE_BYTES + 1) as u64;
        let n = (&mut self.stream)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .map_err(conn_err)?;
        if n == 0 {
            return Err(ChannelError::Connection {
                name: "email".into(),
                reason: "IMAP connection closed".into(),
            });
        }
        if n > MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            self.desynced = true;
            return Err(protocol_err(format!(
                "response line exceeds {MAX_LINE_BYTES} bytes"
            )));
        }
        while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl<S: Read + Write + Send> MailSession for ImapSession<S> {
    fn search_unseen(&mut self) -> Result<Vec<String>, ChannelError> {
        let response = self.command("SEARCH", "SEARCH UNSEEN")?;
        Ok(parse_search(&response.lines))
    }

    fn fetch_rfc822(&mut self, id: &str) -> Result<Vec<u8>, ChannelError> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(protocol_err(format!("invalid message id: {id}")));
        }
        let response = self.command("FETCH", &format!("FETCH {id} (RFC822)"))?;
        response
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| protocol_err(format!("FETCH {id} returned no message body")))
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.desynced {
            // Nothing can be parsed reliably; dropping the stream ends the session.
            return Ok(());
        }

        let close_result = self.command("CLOSE", "CLOSE").map(|_| ());
        let logout_result = self.command("LOGOUT", "LOGOUT").map(|_| ());
        close_result.and(logout_result)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Quote an IMAP string argument.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Length of a literal announced at the end of a line (`... {123}`).
///
/// Lengths too large for `usize` saturate so the caller's limit rejects them.
fn literal_len(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse().unwrap_or(usize::MAX))
}

/// Message ids from `* SEARCH` lines. Non-numeric tokens are ignored.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter(|id| id.bytes().all(|b| b.is_ascii_digit()))
        .map(String::from)
        .collect()
}

fn conn_err(e: std::io::Error) -> ChannelError {
    ChannelError::Connection {
        name: "email".into(),
        reason: e.to_string(),
    }
}

fn protocol_err(reason: String) -> ChannelError {
    ChannelError::Protocol {
        name: "email".into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Replays canned server output and records what the client wrote.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(script: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(script),
                output: Vec::new(),
            }
        }

        fn written(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn fetch_reply(tag: &str, id: &str, message: &[u8]) -> Vec<u8> {
        let mut out = format!("* {id} FETCH (RFC822 {{{}}}\r\n", message.len()).into_bytes();
        out.extend_from_slice(message);
        out.extend_from_slice(b")\r\n");
        out.extend_from_slice(format!("{tag} OK FETCH completed\r\n").as_bytes());
        out
    }

    #[test]
    fn full_sweep_issues_expected_commands() {
        let message = b"From: a@test.com\r\nSubject: Hi\r\n\r\nbody line\r\n";
        let mut script = Vec::new();
        script.extend_from_slice(b"* OK IMAP4rev1 ready\r\n");
        script.extend_from_slice(b"A1 OK LOGIN completed\r\n");
        script.extend_from_slice(b"* 2 EXISTS\r\nA2 OK [READ-WRITE] SELECT completed\r\n");
        script.extend_from_slice(b"* SEARCH 2\r\nA3 OK SEARCH completed\r\n");
        script.extend_from_slice(&fetch_reply("A4", "2", message));
        script.extend_from_slice(b"A5 OK CLOSE completed\r\n");
        script.extend_from_slice(b"* BYE logging out\r\nA6 OK LOGOUT completed\r\n");

        let mut session = ImapSession::new(ScriptedStream::new(script));
        session.read_greeting().unwrap();
        session.login("support@test.com", "p\"w").unwrap();
        session.select("INBOX").unwrap();
        let ids = session.search_unseen().unwrap();
        assert_eq!(ids, vec!["2"]);
        let raw = session.fetch_rfc822("2").unwrap();
        assert_eq!(raw, message.to_vec());
        session.close().unwrap();

        let written = session.get_ref().written();
        let commands: Vec<&str> = written.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(
            commands,
            vec![
                r#"A1 LOGIN "support@test.com" "p\"w""#,
                r#"A2 SELECT "INBOX""#,
                "A3 SEARCH UNSEEN",
                "A4 FETCH 2 (RFC822)",
                "A5 CLOSE",
                "A6 LOGOUT",
            ]
        );
    }

    #[test]
    fn literal_is_read_byte_exact() {
        // Literal contains a line that looks like a tagged response
        let message = b"Subject: x\r\n\r\nA1 OK not really\r\n";
        let script = fetch_reply("A1", "7", message);

        let mut session = ImapSession::new(ScriptedStream::new(script));
        let raw = session.fetch_rfc822("7").unwrap();
        assert_eq!(raw, message.to_vec());
    }

    #[test]
    fn login_rejection_is_connection_error() {
        let script = b"* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n".to_vec();
        let mut session = ImapSession::new(ScriptedStream::new(script));
        session.read_greeting().unwrap();
        let err = session.login("user", "wrong").unwrap_err();
        assert!(matches!(err, ChannelError::Connection { .. }), "got {err:?}");
        // password never echoed in the error
        assert!(!err.to_string().contains("wrong"));
    }

    #[test]
    fn bad_greeting_is_rejected() {
        let script = b"* BYE too many connections\r\n".to_vec();
        let mut session = ImapSession::new(ScriptedStream::new(script));
        assert!(matches!(
            session.read_greeting(),
            Err(ChannelError::Protocol { .. })
        ));
    }

    #[test]
    fn fetch_no_is_protocol_error() {
        let script = b"A1 NO message expunged\r\n".to_vec();
        let mut session = ImapSession::new(ScriptedStream::new(script));
        assert!(matches!(
            session.fetch_rfc822("3"),
            Err(ChannelError::Protocol { .. })
        ));
    }

    #[test]
    fn fetch_rejects_non_numeric_id() {
        let mut session = ImapSession::new(ScriptedStream::new(Vec::new()));
        assert!(session.fetch_rfc822("1 RFC822 ; LOGOUT").is_err());
        assert!(session.get_ref().written().is_empty());
    }

    #[test]
    fn closed_stream_is_connection_error() {
        let mut session = ImapSession::new(ScriptedStream::new(Vec::new()));
        assert!(matches!(
            session.search_unseen(),
            Err(ChannelError::Connection { .. })
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let script = b"A1 OK CLOSE completed\r\nA2 OK LOGOUT completed\r\n".to_vec();
        let mut session = ImapSession::new(ScriptedStream::new(script));
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.get_ref().written(), "A1 CLOSE\r\nA2 LOGOUT\r\n");
    }

    #[test]
    fn close_still_logs_out_when_close_fails() {
        let script = b"A1 BAD no mailbox selected\r\nA2 OK LOGOUT completed\r\n".to_vec();
        let mut session = ImapSession::new(ScriptedStream::new(script));
        assert!(session.close().is_err());
        assert!(session.get_ref().written().contains("A2 LOGOUT"));
    }

    #[test]
    fn parse_search_handles_empty_and_multiple() {
        let lines = vec!["* SEARCH".to_string()];
        assert!(parse_search(&lines).is_empty());

        let lines = vec!["* SEARCH 1 4 9".to_string(), "* OK noise".to_string()];
        assert_eq!(parse_search(&lines), vec!["1", "4", "9"]);
    }

    #[test]
    fn literal_len_parses_trailing_braces() {
        assert_eq!(literal_len("* 1 FETCH (RFC822 {342}"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (FLAGS (\\Seen))"), None);
        assert_eq!(literal_len("{abc}"), None);
        assert_eq!(literal_len("{}"), None);
        assert_eq!(
            literal_len("* 1 FETCH (RFC822 {99999999999999999999999}"),
            Some(usize::MAX)
        );
    }

    #[test]
    fn oversized_literal_is_rejected_without_reading_it() {
        for announced in ["9000000000000000000", "18446744073709551615"] {
            let script = format!("* 1 FETCH (RFC822 {{{announced}}}\r\npartial body").into_bytes();
            let mut session = ImapSession::new(ScriptedStream::new(script));

            let err = session.fetch_rfc822("1").unwrap_err();
            assert!(matches!(err, ChannelError::Protocol { .. }), "got {err:?}");

            // Later commands are refused instead of parsing leftover literal bytes
            assert!(matches!(
                session.search_unseen(),
                Err(ChannelError::Connection { .. })
            ));
            session.close().unwrap();
            assert_eq!(session.get_ref().written(), "A1 FETCH 1 (RFC822)\r\n");
        }
    }

    #[test]
    fn large_literal_under_limit_is_read() {
        let message = vec![b'x'; 1024 * 1024];
        let script = fetch_reply("A1", "1", &message);
        let mut session = ImapSession::new(ScriptedStream::new(script));
        assert_eq!(session.fetch_rfc822("1").unwrap().len(), message.len());
    }

    #[test]
    fn endless_line_is_rejected() {
        let mut script = b"* SEARCH ".to_vec();
        script.extend(std::iter::repeat_n(b'1', MAX_LINE_BYTES + 16));
        let mut session = ImapSession::new(ScriptedStream::new(script));

        let err = session.search_unseen().unwrap_err();
        assert!(matches!(err, ChannelError::Protocol { .. }), "got {err:?}");
        assert!(matches!(
            session.fetch_rfc822("1"),
            Err(ChannelError::Connection { .. })
        ));
    }

    #[test]
    fn line_just_under_limit_is_accepted() {
        let mut script = b"* SEARCH 7 ".to_vec();
        script.extend(std::iter::repeat_n(b' ', MAX_LINE_BYTES - script.len() - 2));
        script.extend_from_slice(b"\r\nA1 OK SEARCH completed\r\n");
        let mut session = ImapSession::new(ScriptedStream::new(script));
        assert_eq!(session.search_unseen().unwrap(), vec!["7"]);
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("INBOX"), "\"INBOX\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}
