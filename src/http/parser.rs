//! Request reader and header tokenizer.
//!
//! # Responsibilities
//! - Accumulate bytes until the blank line ending the header block
//! - Tokenize the request line and header lines
//! - Read the body (by `Content-Length`, else whatever arrives without a
//!   pause longer than [`UNDECLARED_BODY_WAIT`])
//!
//! # Design Decisions
//! - Lenient: header names are not validated, lines without a colon are
//!   skipped, a bare `\n` line ending is accepted, a missing version
//!   defaults to HTTP/1.0
//! - Every read is bounded by the read timeout; after the configured
//!   number of timeouts whatever has arrived is decoded, and an empty
//!   buffer means the client is abandoned

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::WebServerConfig;
use crate::http::request::{Headers, Method, Request};

/// Quiet period that ends a body sent without `Content-Length`.
pub const UNDECLARED_BODY_WAIT: Duration = Duration::from_millis(50);

/// Error reading or decoding a request.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("client sent nothing before the read timeout")]
    Timeout,
    #[error("connection closed before a request arrived")]
    ConnectionClosed,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounds on how long and how much we read.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub read_timeout: Duration,
    /// Consecutive read timeouts tolerated before giving up.
    pub max_timeouts: u32,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl ReadLimits {
    pub fn from_config(config: &WebServerConfig) -> Self {
        Self {
            read_timeout: Duration::from_secs(config.request_timeout),
            max_timeouts: config.read_timeout_retries.max(1),
            max_header_bytes: config.max_header_bytes,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Decoded request line and headers.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: Headers,
}

/// Position of the header terminator and its length.
///
/// Accepts `\r\n\r\n` and the lenient `\n\n`, whichever comes first.
pub fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(buf, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(buf, b"\n\n").map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    RequestLine,
    HeaderLines,
}

/// Tokenize a header block (without the terminator).
pub fn parse_head(head: &[u8]) -> Result<RequestHead, ParseError> {
    let text = String::from_utf8_lossy(head);
    let mut state = HeadState::RequestLine;
    let mut request_line = None;
    let mut headers = Headers::new();

    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        match state {
            HeadState::RequestLine => {
                // Tolerate stray blank lines before the request line.
                if line.trim().is_empty() {
                    continue;
                }
                request_line = Some(parse_request_line(line)?);
                state = HeadState::HeaderLines;
            }
            HeadState::HeaderLines => {
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    headers.insert(name.trim(), value.trim());
                }
            }
        }
    }

    let (method, target, version) =
        request_line.ok_or(ParseError::BadRequest("empty request"))?;
    Ok(RequestHead {
        method,
        target,
        version,
        headers,
    })
}

fn parse_request_line(line: &str) -> Result<(Method, String, String), ParseError> {
    let mut tokens = line.split_whitespace();
    let method_token = tokens.next().ok_or(ParseError::BadRequest("empty request line"))?;
    let target = tokens
        .next()
        .ok_or(ParseError::BadRequest("missing request target"))?;
    let version = tokens.next().unwrap_or("HTTP/1.0");

    let method = method_token
        .parse::<Method>()
        .map_err(|_| ParseError::MethodNotAllowed(method_token.to_string()))?;
    Ok((method, target.to_string(), version.to_string()))
}

enum ReadOutcome {
    Data(usize),
    Eof,
    TimedOut,
}

async fn read_chunk<S>(
    stream: &mut S,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<ReadOutcome, ParseError>
where
    S: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, stream.read(buf)).await {
        Err(_) => Ok(ReadOutcome::TimedOut),
        Ok(Ok(0)) => Ok(ReadOutcome::Eof),
        Ok(Ok(n)) => Ok(ReadOutcome::Data(n)),
        Ok(Err(e)) => Err(ParseError::Io(e)),
    }
}

/// Read one request from `stream`.
pub async fn read_request<S>(stream: &mut S, limits: &ReadLimits) -> Result<Request, ParseError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let mut timeouts = 0;

    let (head_len, body_start) = loop {
        if let Some((at, len)) = find_header_end(&buf) {
            break (at, at + len);
        }
        if buf.len() > limits.max_header_bytes {
            return Err(ParseError::BadRequest("header block too large"));
        }
        match read_chunk(stream, &mut chunk, limits.read_timeout).await? {
            ReadOutcome::Data(n) => {
                buf.extend_from_slice(&chunk[..n]);
                timeouts = 0;
            }
            ReadOutcome::Eof if buf.is_empty() => return Err(ParseError::ConnectionClosed),
            ReadOutcome::Eof => break (buf.len(), buf.len()),
            ReadOutcome::TimedOut => {
                timeouts += 1;
                if timeouts >= limits.max_timeouts {
                    if buf.is_empty() {
                        return Err(ParseError::Timeout);
                    }
                    tracing::debug!(bytes = buf.len(), "Header terminator not seen, decoding partial request");
                    break (buf.len(), buf.len());
                }
            }
        }
    };

    let head = parse_head(&buf[..head_len])?;
    let body = buf.split_off(body_start);
    let mut request = Request {
        method: head.method,
        target: head.target,
        version: head.version,
        headers: head.headers,
        body,
    };

    let declared = request
        .content_length()
        .transpose()
        .map_err(|_| ParseError::BadRequest("invalid Content-Length"))?;
    if declared.unwrap_or(0) > limits.max_body_bytes {
        return Err(ParseError::BadRequest("body too large"));
    }

    let body = &mut request.body;
    match declared {
        Some(expected) => {
            timeouts = 0;
            while body.len() < expected {
                match read_chunk(stream, &mut chunk, limits.read_timeout).await? {
                    ReadOutcome::Data(n) => body.extend_from_slice(&chunk[..n]),
                    ReadOutcome::Eof => break,
                    ReadOutcome::TimedOut => {
                        timeouts += 1;
                        if timeouts >= limits.max_timeouts {
                            break;
                        }
                    }
                }
            }
            body.truncate(expected);
        }
        None if request.method.is_bodyless() => body.clear(),
        // Clients that omit the length usually send nothing more and keep
        // the socket open, so only wait briefly for trailing bytes.
        None => {
            let wait = limits.read_timeout.min(UNDECLARED_BODY_WAIT);
            loop {
                if body.len() > limits.max_body_bytes {
                    return Err(ParseError::BadRequest("body too large"));
                }
                match read_chunk(stream, &mut chunk, wait).await? {
                    ReadOutcome::Data(n) => body.extend_from_slice(&chunk[..n]),
                    ReadOutcome::Eof | ReadOutcome::TimedOut => break,
                }
            }
        }
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn limits() -> ReadLimits {
        ReadLimits {
            read_timeout: Duration::from_millis(200),
            max_timeouts: 1,
            max_header_bytes: 1024,
            max_body_bytes: 256,
        }
    }

    async fn parse_bytes(input: &[u8]) -> Result<Request, ParseError> {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client.write_all(input).await.unwrap();
        drop(client);
        read_request(&mut server, &limits()).await
    }

    #[tokio::test]
    async fn parses_get_with_headers() {
        let req = parse_bytes(b"GET /api/status?x=1 HTTP/1.1\r\nHost: relay\r\nCookie: session_id=abc\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path(), "/api/status");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("cookie"), Some("session_id=abc"));
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn reads_body_by_content_length() {
        let req = parse_bytes(
            b"POST /api/relay/set HTTP/1.1\r\nContent-Length: 15\r\n\r\n{\"state\":\"on\"}trailing",
        )
        .await
        .unwrap();
        assert_eq!(req.body, b"{\"state\":\"on\"}t".to_vec());
    }

    #[tokio::test]
    async fn reads_body_until_eof_without_length() {
        let req = parse_bytes(b"POST /login HTTP/1.1\r\n\r\nusername=a&password=b")
            .await
            .unwrap();
        assert_eq!(req.form_field("username").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn undeclared_body_does_not_wait_for_read_timeout() {
        let slow = ReadLimits {
            read_timeout: Duration::from_secs(5),
            ..limits()
        };
        let (mut client, mut server) = tokio::io::duplex(4096);
        client
            .write_all(b"POST /api/relay/set HTTP/1.1\r\nHost: d\r\n\r\nstate=on")
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let req = read_request(&mut server, &slow).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(req.form_field("state").as_deref(), Some("on"));

        let (mut client2, mut server2) = tokio::io::duplex(4096);
        client2
            .write_all(b"POST /api/relay/toggle HTTP/1.1\r\nHost: d\r\n\r\n")
            .await
            .unwrap();
        let started = tokio::time::Instant::now();
        let req = read_request(&mut server2, &slow).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(req.body.is_empty());
        drop((client, client2));
    }

    #[tokio::test]
    async fn body_arriving_in_pieces() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            client
                .write_all(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\n01234")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(b"56789").await.unwrap();
            client
        });
        let req = read_request(&mut server, &limits()).await.unwrap();
        assert_eq!(req.body, b"0123456789".to_vec());
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_headers_last_wins() {
        let req = parse_bytes(b"GET / HTTP/1.1\r\nX-A: 1\r\nx-a: 2\r\n\r\n").await.unwrap();
        assert_eq!(req.header("X-A"), Some("2"));
        assert_eq!(req.headers.len(), 1);
    }

    #[tokio::test]
    async fn lenient_header_lines() {
        let req = parse_bytes(b"GET / HTTP/1.1\nno colon here\nBad Name: ok\n\n")
            .await
            .unwrap();
        assert_eq!(req.header("bad name"), Some("ok"));
        assert_eq!(req.headers.len(), 1);
    }

    #[tokio::test]
    async fn missing_target_is_bad_request() {
        let err = parse_bytes(b"GET\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ParseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_method_not_allowed() {
        let err = parse_bytes(b"BREW /pot HTTP/1.1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ParseError::MethodNotAllowed(ref m) if m == "BREW"));
    }

    #[tokio::test]
    async fn invalid_content_length_is_bad_request() {
        let err = parse_bytes(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ParseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let err = parse_bytes(b"POST / HTTP/1.1\r\nContent-Length: 100000\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ParseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn oversized_header_rejected() {
        let mut input = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(2048));
        let err = parse_bytes(&input).await.unwrap_err();
        assert!(matches!(err, ParseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn empty_connection_closed() {
        let err = parse_bytes(b"").await.unwrap_err();
        assert!(matches!(err, ParseError::ConnectionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_request(&mut server, &limits()).await.unwrap_err();
        assert!(matches!(err, ParseError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_head_decoded_after_timeout() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"GET /api/stats HTTP/1.0\r\n").await.unwrap();
        let req = read_request(&mut server, &limits()).await.unwrap();
        assert_eq!(req.path(), "/api/stats");
        drop(client);
    }

    #[test]
    fn header_end_prefers_first_terminator() {
        assert_eq!(find_header_end(b"a\r\n\r\nb\n\n"), Some((1, 4)));
        assert_eq!(find_header_end(b"a\n\nb\r\n\r\n"), Some((1, 2)));
        assert_eq!(find_header_end(b"a\r\nb"), None);
    }

    #[test]
    fn missing_version_defaults() {
        let head = parse_head(b"GET /").unwrap();
        assert_eq!(head.version, "HTTP/1.0");
    }
}
