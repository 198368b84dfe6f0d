//! TLS Layer
//!
//! TLS support using rustls. Server certificates are checked against the
//! Mozilla root set from `webpki-roots`; there is no pinning.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::tcp::TcpConnection;

/// TLS configuration
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Enable session resumption
    pub session_resumption: bool,
    /// ALPN protocols
    pub alpn_protocols: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            session_resumption: true,
            alpn_protocols: vec!["http/1.1".into()],
        }
    }
}

impl TlsConfig {
    /// Build the rustls client configuration
    pub fn build(&self) -> Arc<ClientConfig> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        tls_config.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        if !self.session_resumption {
            tls_config.resumption = rustls::client::Resumption::disabled();
        }

        Arc::new(tls_config)
    }
}

/// TLS stream wrapper over TCP using rustls
#[derive(Debug)]
pub struct TlsStream {
    /// Rustls stream owning the connection
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl TlsStream {
    /// Run the TLS handshake over an established TCP connection
    pub fn connect(tcp: TcpConnection, server_name: &str, config: Arc<ClientConfig>) -> io::Result<Self> {
        let name: ServerName<'static> = server_name
            .to_string()
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid server name"))?;

        let conn = ClientConnection::new(config, name)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut stream = StreamOwned::new(conn, tcp.into_inner());

        // Drive the handshake now so certificate errors surface at connect time
        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock)?;
        }

        tracing::debug!(
            server = server_name,
            version = ?stream.conn.protocol_version(),
            alpn = ?stream.conn.alpn_protocol().map(String::from_utf8_lossy),
            "TLS handshake complete"
        );

        Ok(Self { stream })
    }

    /// Send close_notify and shut the socket down
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.stream.conn.send_close_notify();
        // Best effort: the peer may already be gone
        let _ = self.stream.flush();
        self.stream.sock.shutdown(std::net::Shutdown::Both)
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
