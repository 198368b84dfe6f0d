//! woody Networking
//!
//! URL resolution and a small HTTP/1.1 client used to fetch documents for
//! rendering. Supports `http`, `https`, `file`, `data` and `view-source`
//! URLs, keeps connections alive per origin and follows redirects.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod uri;
pub mod connection_pool;
pub mod tcp;
pub mod tls;
pub mod transport;
pub mod http1;
pub mod client;
pub mod text;

pub use uri::{Scheme, UriReference};
pub use connection_pool::{ConnectionKey, ConnectionPool, PoolStats, TransportHandle};
pub use tcp::{TcpConfig, TcpConnection};
pub use tls::{TlsConfig, TlsStream};
pub use transport::{Connector, NetStream, Transport};
pub use http1::{Http1Parser, Http1Request, Http1Response, HttpVersion};
pub use client::{ClientConfig, HttpClient, HttpClientBuilder};

/// Resolve and fetch a URL with a throwaway client
pub fn load(url: &str) -> Result<String, NetError> {
    HttpClient::new().load(url)
}

/// Network error
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Malformed URI: {0}")]
    MalformedUri(String),

    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {host} failed: {source}")]
    TlsHandshakeFailed {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed status line: {0:?}")]
    MalformedStatusLine(String),

    #[error("Malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    #[error("Unsupported encoding: {header}: {value}")]
    UnsupportedEncoding { header: String, value: String },

    #[error("Response has neither Content-Length nor Connection: close")]
    UnframedBody,

    #[error("Connection closed before a response was received")]
    EmptyResponse,

    #[error("Error: Too many redirects (maximum {0})")]
    TooManyRedirects(u32),

    #[error("{}", file_error_message(.path, .source))]
    FileIo {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Error processing data URL: {0}")]
    DataDecode(String),

    #[error("Socket write failed: {0}")]
    SocketWriteFailed(#[source] io::Error),

    #[error("Network error: {0}")]
    Io(#[from] io::Error),
}

impl NetError {
    /// Errors that are reported to the user as page text instead of failing
    /// the load.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NetError::FileIo { .. } | NetError::DataDecode(_) | NetError::TooManyRedirects(_)
        )
    }
}

fn file_error_message(path: &str, source: &io::Error) -> String {
    if source.kind() == io::ErrorKind::NotFound {
        format!("File not found: {}", path)
    } else {
        format!("Error reading file: {}", source)
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
