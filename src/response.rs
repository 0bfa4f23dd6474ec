use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use tracing::debug;

use crate::client::Connection;
use crate::error::{is_timeout_kind, ClientError};

// Upper bound on status line + headers. Anything larger is not a calculator answer.
pub const MAX_HEAD_SIZE: usize = 8192;

// Upper bound on a body, whatever the server claims in Content-Length or chunk sizes.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

// How the end of the body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Chunked,
    Length(usize),
    UntilClose,
}

fn malformed(message: impl Into<String>) -> ClientError {
    ClientError::MalformedResponse(message.into())
}

fn body_too_large() -> ClientError {
    malformed(format!("response body exceeds {} bytes", MAX_BODY_SIZE))
}

impl Head {
    // Header lookup ignores case, as HTTP header names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn framing(&self) -> Result<Framing, ClientError> {
        if let Some(encoding) = self.header("transfer-encoding") {
            if encoding.to_ascii_lowercase().contains("chunked") {
                return Ok(Framing::Chunked);
            }
        }
        match self.header("content-length") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map(Framing::Length)
                .map_err(|_| malformed(format!("bad Content-Length {:?}", value))),
            None => Ok(Framing::UntilClose),
        }
    }
}

/*
A live response. It owns the connection it came from.

The body can be read exactly once with read() or text(). The connection is released by
close(), which is safe to call any number of times, and again when the Response is dropped.
*/
pub struct Response {
    head: Head,
    framing: Framing,
    reader: Option<BufReader<Connection>>,
    body_consumed: bool,
    host: String,
    timeout: Duration,
}

impl Response {
    pub(crate) fn new(
        head: Head,
        reader: BufReader<Connection>,
        host: String,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let framing = head.framing()?;
        Ok(Response {
            head,
            framing,
            reader: Some(reader),
            body_consumed: false,
            host,
            timeout,
        })
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn reason(&self) -> &str {
        &self.head.reason
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    // Reads the whole body. A second call fails with BodyAlreadyRead.
    pub fn read(&mut self) -> Result<Vec<u8>, ClientError> {
        if self.body_consumed {
            return Err(ClientError::BodyAlreadyRead);
        }
        self.body_consumed = true;
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Err(ClientError::BodyAlreadyRead),
        };
        match read_body(reader, self.framing) {
            Ok(body) => Ok(body),
            Err(err) => {
                let err = match err {
                    ClientError::Io(io) if is_timeout_kind(io.kind()) => ClientError::Timeout {
                        host: self.host.clone(),
                        seconds: self.timeout.as_secs(),
                    },
                    other => other,
                };
                self.close();
                Err(err)
            }
        }
    }

    // Reads the body and decodes it as UTF-8.
    pub fn text(&mut self) -> Result<String, ClientError> {
        let body = self.read()?;
        String::from_utf8(body).map_err(|_| malformed("body is not valid UTF-8"))
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    // Releases the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            debug!(host = %self.host, status = self.head.status, "closing response");
            // Dropping the connection shuts the socket down.
            drop(reader);
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.head.status)
            .field("reason", &self.head.reason)
            .field("framing", &self.framing)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// Parses "HTTP/1.1 200 OK" into its three parts. The reason phrase may be empty or have spaces.
pub fn parse_status_line(line: &str) -> Option<(String, u16, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.splitn(3, ' ');
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    let status = code.parse::<u16>().ok()?;
    let reason = parts.next().unwrap_or("").to_string();
    Some((version.to_string(), status, reason))
}

// Reads one CRLF (or bare LF) terminated line without letting it grow past `budget` bytes.
fn read_limited_line<R: BufRead>(
    reader: &mut R,
    budget: &mut usize,
) -> Result<String, ClientError> {
    let mut line = Vec::new();
    let read = reader.by_ref().take(*budget as u64 + 1).read_until(b'\n', &mut line)?;
    if read > *budget {
        return Err(malformed(format!("response head exceeds {} bytes", MAX_HEAD_SIZE)));
    }
    *budget -= read;
    if read == 0 || !line.ends_with(b"\n") {
        return Err(malformed("connection closed inside response head"));
    }
    let line = String::from_utf8(line).map_err(|_| malformed("response head is not valid UTF-8"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/*
Reads the status line and headers, up to and including the blank line.

Interim 1xx responses (100 Continue, 103 Early Hints) are skipped; the first final
response is returned. The whole head, interim responses included, must fit in MAX_HEAD_SIZE.
*/
pub fn read_head<R: BufRead>(reader: &mut R) -> Result<Head, ClientError> {
    let mut budget = MAX_HEAD_SIZE;
    loop {
        let status_line = read_limited_line(reader, &mut budget)?;
        let (version, status, reason) = parse_status_line(&status_line)
            .ok_or_else(|| malformed(format!("bad status line {:?}", status_line)))?;

        let mut headers = Vec::new();
        loop {
            let line = read_limited_line(reader, &mut budget)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("bad header line {:?}", line)))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        if (100..200).contains(&status) && status != 101 {
            continue;
        }
        return Ok(Head { version, status, reason, headers });
    }
}

/*
Reads the body according to its framing.

The buffer only grows with bytes that actually arrive, never with what the server
announces, and never past MAX_BODY_SIZE.
*/
pub fn read_body<R: BufRead>(reader: &mut R, framing: Framing) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    match framing {
        Framing::Length(len) => {
            if len > MAX_BODY_SIZE {
                return Err(body_too_large());
            }
            reader.by_ref().take(len as u64).read_to_end(&mut body)?;
            if body.len() < len {
                return Err(malformed(format!("body shorter than Content-Length {}", len)));
            }
        }
        Framing::UntilClose => {
            reader.by_ref().take(MAX_BODY_SIZE as u64 + 1).read_to_end(&mut body)?;
            if body.len() > MAX_BODY_SIZE {
                return Err(body_too_large());
            }
        }
        Framing::Chunked => read_chunked(reader, &mut body)?,
    }
    Ok(body)
}

/*
Chunked transfer coding:

    <hex size>[;extensions]\r\n
    <size bytes>\r\n
    ...
    0\r\n
    [trailer headers]\r\n
    \r\n
*/
fn read_chunked<R: BufRead>(reader: &mut R, body: &mut Vec<u8>) -> Result<(), ClientError> {
    loop {
        let mut budget = MAX_HEAD_SIZE;
        let size_line = read_limited_line(reader, &mut budget)?;
        let size_field = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| malformed(format!("bad chunk size {:?}", size_line)))?;

        if size == 0 {
            // Trailers, then the final blank line.
            loop {
                if read_limited_line(reader, &mut budget)?.is_empty() {
                    return Ok(());
                }
            }
        }

        let end = body
            .len()
            .checked_add(size)
            .filter(|end| *end <= MAX_BODY_SIZE)
            .ok_or_else(body_too_large)?;
        reader.by_ref().take(size as u64).read_to_end(body)?;
        if body.len() < end {
            return Err(malformed("connection closed inside a chunk"));
        }

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if &crlf != b"\r\n" {
            return Err(malformed("chunk not terminated by CRLF"));
        }
    }
}
