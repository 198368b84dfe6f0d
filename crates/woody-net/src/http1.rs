//! HTTP/1.1 Framing
//!
//! Request serialization and response parsing for HTTP/1.1.
//!
//! The parser frames a response from raw bytes: status line, headers, then a
//! body delimited by `Content-Length` or by the connection closing. Chunked
//! transfer coding and content codings are refused rather than passed
//! through undecoded.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::transport::Transport;
use crate::NetError;

/// HTTP/1.1 request
#[derive(Debug, Clone)]
pub struct Http1Request {
    /// HTTP method
    pub method: String,
    /// Request target (e.g., "/index.html")
    pub path: String,
    /// HTTP version
    pub version: HttpVersion,
    /// Request headers, in send order
    pub headers: Vec<(String, String)>,
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    Http10,
    #[default]
    Http11,
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpVersion::Http10 => write!(f, "HTTP/1.0"),
            HttpVersion::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

impl Http1Request {
    /// Create a GET request
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".into(),
            path: path.to_string(),
            version: HttpVersion::Http11,
            headers: Vec::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(format!("{} {} {}\r\n", self.method, self.path, self.version).as_bytes());

        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Write to a stream
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.serialize())?;
        writer.flush()
    }
}

/// HTTP/1.1 response
#[derive(Debug, Clone)]
pub struct Http1Response {
    /// HTTP version
    pub version: HttpVersion,
    /// Status code
    pub status: u16,
    /// Status reason phrase
    pub reason: String,
    /// Headers by lower-cased name; the first of duplicate headers wins
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

impl Http1Response {
    /// Get header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get Content-Length
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Check if connection should be kept alive
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.version, &self.headers)
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response is redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Get redirect location
    pub fn redirect_location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Body as text, with invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn keep_alive(version: HttpVersion, headers: &HashMap<String, String>) -> bool {
    let connection = headers.get("connection").map(String::as_str);
    match version {
        // HTTP/1.0: keep-alive only if explicitly requested
        HttpVersion::Http10 => connection.is_some_and(|v| v.eq_ignore_ascii_case("keep-alive")),
        // HTTP/1.1: keep-alive by default unless "close"
        HttpVersion::Http11 => !connection.is_some_and(|v| v.eq_ignore_ascii_case("close")),
    }
}

/// HTTP/1.1 response parser
pub struct Http1Parser {
    /// HTTP version
    version: HttpVersion,
    /// Status code
    status: u16,
    /// Reason phrase
    reason: String,
    /// Parsed headers
    headers: HashMap<String, String>,
}

impl Http1Parser {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::Http11,
            status: 0,
            reason: String::new(),
            headers: HashMap::new(),
        }
    }

    /// Read one response from a transport positioned at its first byte
    pub fn parse<S: Read>(transport: &mut Transport<S>) -> Result<Http1Response, NetError> {
        let mut parser = Self::new();

        let status_line = transport.read_line().map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => NetError::EmptyResponse,
            _ => NetError::Io(e),
        })?;
        parser.parse_status_line(&String::from_utf8_lossy(&status_line))?;

        loop {
            let line = transport.read_line()?;
            if line.is_empty() {
                break;
            }
            parser.parse_header_line(&String::from_utf8_lossy(&line))?;
        }

        for name in ["transfer-encoding", "content-encoding"] {
            if let Some(value) = parser.headers.get(name) {
                return Err(NetError::UnsupportedEncoding {
                    header: name.to_string(),
                    value: value.clone(),
                });
            }
        }

        let body = parser.read_body(transport)?;

        Ok(Http1Response {
            version: parser.version,
            status: parser.status,
            reason: parser.reason,
            headers: parser.headers,
            body,
        })
    }

    fn parse_status_line(&mut self, line: &str) -> Result<(), NetError> {
        let malformed = || NetError::MalformedStatusLine(line.to_string());

        let mut parts = line.splitn(3, ' ');
        let (Some(version), Some(status), Some(reason)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed());
        };

        self.version = match version {
            "HTTP/1.0" => HttpVersion::Http10,
            v if v.starts_with("HTTP/") => HttpVersion::Http11,
            _ => return Err(malformed()),
        };

        self.status = status.parse().map_err(|_| malformed())?;
        self.reason = reason.to_string();

        Ok(())
    }

    fn parse_header_line(&mut self, line: &str) -> Result<(), NetError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| NetError::MalformedHeaderLine(line.to_string()))?;

        self.headers
            .entry(name.trim().to_ascii_lowercase())
            .or_insert_with(|| value.trim().to_string());

        Ok(())
    }

    fn read_body<S: Read>(&self, transport: &mut Transport<S>) -> Result<Vec<u8>, NetError> {
        // No body by definition
        if (100..200).contains(&self.status) || self.status == 204 || self.status == 304 {
            return Ok(Vec::new());
        }

        if let Some(value) = self.headers.get("content-length") {
            let len: usize = value
                .parse()
                .map_err(|_| NetError::MalformedHeaderLine(format!("content-length: {}", value)))?;
            return Ok(transport.read_exact(len)?);
        }

        // Reading to EOF on a connection that stays open would swallow the
        // next response
        if keep_alive(self.version, &self.headers) {
            return Err(NetError::UnframedBody);
        }

        Ok(transport.read_to_close()?)
    }
}

impl Default for Http1Parser {
    fn default() -> Self {
        Self::new()
    }
}
