//! TCP Connection Layer
//!
//! Blocking TCP connections with connect, read and write timeouts.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP connection configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Connection timeout, per resolved address
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Option<Duration>,
    /// Write timeout
    pub write_timeout: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Some(Duration::from_secs(60)),
            write_timeout: Some(Duration::from_secs(60)),
            nodelay: true,
        }
    }
}

/// TCP connection
#[derive(Debug)]
pub struct TcpConnection {
    /// Underlying stream
    stream: StdTcpStream,
    /// Remote address
    remote_addr: SocketAddr,
}

impl TcpConnection {
    /// Connect to `host:port`, trying every resolved address in turn
    pub fn connect(host: &str, port: u16, config: &TcpConfig) -> io::Result<Self> {
        let mut last_err = None;

        for addr in (host, port).to_socket_addrs()? {
            match Self::connect_to_addr(addr, config) {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address found for {}", host))
        }))
    }

    /// Connect to a SocketAddr
    pub fn connect_to_addr(addr: SocketAddr, config: &TcpConfig) -> io::Result<Self> {
        let stream = StdTcpStream::connect_timeout(&addr, config.connect_timeout)?;

        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;

        Ok(Self {
            stream,
            remote_addr: addr,
        })
    }

    /// Get remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Take the inner stream (for TLS upgrade)
    pub fn into_inner(self) -> StdTcpStream {
        self.stream
    }

    /// Shutdown the connection
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.stream.shutdown(how)
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(60)));
        assert!(config.nodelay);
    }

    #[test]
    fn test_connect_localhost() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let conn = TcpConnection::connect("127.0.0.1", port, &TcpConfig::default()).unwrap();
        assert_eq!(conn.remote_addr().port(), port);
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        assert!(TcpConnection::connect("127.0.0.1", port, &TcpConfig::default()).is_err());
    }
}
