//! Transport
//!
//! A byte stream (plain TCP or TLS) with a read buffer. Reading is split
//! into explicit operations: a CRLF-terminated line, exactly N bytes, or
//! everything until the peer closes. Bytes are never decoded here.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::sync::Arc;

use crate::connection_pool::ConnectionKey;
use crate::tcp::{TcpConfig, TcpConnection};
use crate::tls::{TlsConfig, TlsStream};
use crate::NetError;

/// Read buffer size
const READ_BUF_SIZE: usize = 8192;
/// Longest status or header line accepted
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Plain or TLS-wrapped TCP stream
#[derive(Debug)]
pub enum NetStream {
    Tcp(TcpConnection),
    Tls(Box<TlsStream>),
}

impl NetStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            NetStream::Tcp(tcp) => tcp.shutdown(Shutdown::Both),
            NetStream::Tls(tls) => tls.shutdown(),
        }
    }
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            NetStream::Tcp(tcp) => tcp.read(buf),
            NetStream::Tls(tls) => tls.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            NetStream::Tcp(tcp) => tcp.write(buf),
            NetStream::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            NetStream::Tcp(tcp) => tcp.flush(),
            NetStream::Tls(tls) => tls.flush(),
        }
    }
}

/// Buffered stream with explicit framing reads
#[derive(Debug)]
pub struct Transport<S = NetStream> {
    /// Inner stream
    stream: S,
    /// Read buffer
    read_buf: Vec<u8>,
    /// Current read position
    read_pos: usize,
    /// Data available in read buffer
    read_available: usize,
    /// Set once `close` has run
    closed: bool,
}

impl<S> Transport<S> {
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            read_buf: vec![0u8; READ_BUF_SIZE],
            read_pos: 0,
            read_available: 0,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes read from the stream but not consumed yet
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf[self.read_pos..self.read_available]
    }
}

impl<S: Read> Transport<S> {
    /// Refill the buffer; returns the number of new bytes (0 at EOF)
    fn fill(&mut self) -> io::Result<usize> {
        loop {
            match self.stream.read(&mut self.read_buf) {
                Ok(n) => {
                    self.read_pos = 0;
                    self.read_available = n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read one line, without its `\r\n` (a bare `\n` is accepted too).
    ///
    /// Fails with `UnexpectedEof` if the stream ends before any byte.
    pub fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buffered = &self.read_buf[self.read_pos..self.read_available];
            if let Some(newline) = buffered.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buffered[..newline]);
                self.read_pos += newline + 1;

                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }

            line.extend_from_slice(buffered);
            self.read_pos = self.read_available;

            if line.len() > MAX_LINE_LEN {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
            }

            if self.fill()? == 0 {
                if line.is_empty() {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Connection closed"));
                }
                return Ok(line);
            }
        }
    }

    /// Read exactly `count` bytes.
    ///
    /// `count` is peer-supplied: at most one buffer is reserved up front.
    pub fn read_exact(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut result = Vec::with_capacity(count.min(READ_BUF_SIZE));

        while result.len() < count {
            if self.read_pos == self.read_available && self.fill()? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body ended after {} of {} bytes", result.len(), count),
                ));
            }

            let take = (self.read_available - self.read_pos).min(count - result.len());
            result.extend_from_slice(&self.read_buf[self.read_pos..self.read_pos + take]);
            self.read_pos += take;
        }

        Ok(result)
    }

    /// Read until the peer closes the connection
    pub fn read_to_close(&mut self) -> io::Result<Vec<u8>> {
        let mut result = self.buffered().to_vec();
        self.read_pos = self.read_available;

        loop {
            match self.fill() {
                Ok(0) => break,
                Ok(n) => {
                    result.extend_from_slice(&self.read_buf[..n]);
                    self.read_pos = n;
                }
                // TLS peers often close without close_notify
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }
}

impl<S: Write> Transport<S> {
    /// Write and flush `data`. Fails with `BrokenPipe` once closed.
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"));
        }
        self.stream.write_all(data)?;
        self.stream.flush()
    }
}

impl Transport<NetStream> {
    /// Open a connection to `host:port`, TLS-wrapped when `secure`
    pub fn open(
        host: &str,
        port: u16,
        secure: bool,
        tcp_config: &TcpConfig,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Result<Self, NetError> {
        let tcp = TcpConnection::connect(host, port, tcp_config).map_err(|source| {
            NetError::ConnectFailed {
                host: host.to_string(),
                port,
                source,
            }
        })?;

        let stream = if secure {
            let tls = TlsStream::connect(tcp, host, tls_config).map_err(|source| {
                NetError::TlsHandshakeFailed {
                    host: host.to_string(),
                    source,
                }
            })?;
            NetStream::Tls(Box::new(tls))
        } else {
            NetStream::Tcp(tcp)
        };

        tracing::debug!(host, port, secure, "connection opened");
        Ok(Self::from_stream(stream))
    }

    /// Shut the connection down. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.read_pos = self.read_available;

        if let Err(e) = self.stream.shutdown() {
            tracing::trace!(error = %e, "shutdown on closing transport failed");
        }
    }
}

/// Opens transports with a shared TCP/TLS configuration
#[derive(Debug, Clone)]
pub struct Connector {
    tcp: TcpConfig,
    tls: Arc<rustls::ClientConfig>,
}

impl Connector {
    pub fn new(tcp: TcpConfig, tls: &TlsConfig) -> Self {
        Self { tcp, tls: tls.build() }
    }

    /// Open a transport for a pool key
    pub fn open(&self, key: &ConnectionKey) -> Result<Transport, NetError> {
        Transport::open(&key.host, key.port, key.is_tls(), &self.tcp, Arc::clone(&self.tls))
    }
}
