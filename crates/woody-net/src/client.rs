//! HTTP Client
//!
//! Resolves a URL to a body string. `file:` and `data:` URLs are answered
//! locally, `view-source:` unwraps its inner URL, and `http`/`https` go over
//! pooled keep-alive connections with redirect following.
//!
//! Failures the user should simply see (a missing file, an undecodable data
//! URL, a redirect loop) come back as page text. Protocol violations and
//! network failures are returned as errors.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64ct::{Base64, Encoding};
use percent_encoding::percent_decode_str;

use crate::connection_pool::{ConnectionKey, ConnectionPool, TransportHandle};
use crate::http1::{Http1Parser, Http1Request, Http1Response};
use crate::lock;
use crate::tcp::TcpConfig;
use crate::tls::TlsConfig;
use crate::transport::{Connector, Transport};
use crate::uri::UriReference;
use crate::NetError;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string
    pub user_agent: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read and write timeout on sockets
    pub request_timeout: Duration,
    /// Max redirects to follow
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("woody/", env!("CARGO_PKG_VERSION")).into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_redirects: 10,
        }
    }
}

/// HTTP client builder
pub struct HttpClientBuilder {
    config: ClientConfig,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = ua.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn build(self) -> HttpClient {
        HttpClient::with_config(self.config)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client.
///
/// Methods take `&self`; share one client across threads with an `Arc`.
/// Pooled connections are closed when the client is dropped.
pub struct HttpClient {
    /// Configuration
    config: ClientConfig,
    /// Opens new transports
    connector: Connector,
    /// Connection pool
    pool: ConnectionPool,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a client builder
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create with custom config
    pub fn with_config(config: ClientConfig) -> Self {
        let tcp_config = TcpConfig {
            connect_timeout: config.connect_timeout,
            read_timeout: Some(config.request_timeout),
            write_timeout: Some(config.request_timeout),
            ..Default::default()
        };

        Self {
            connector: Connector::new(tcp_config, &TlsConfig::default()),
            pool: ConnectionPool::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connection pool
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Close every pooled connection
    pub fn close_all(&self) {
        for (key, handle) in self.pool.drain() {
            lock(&handle).close();
            tracing::debug!(%key, "pooled connection closed");
        }
    }

    /// Parse `url` and fetch its body
    pub fn load(&self, url: &str) -> Result<String, NetError> {
        let uri = UriReference::parse(url)?;
        self.dispatch(&uri)
    }

    /// Fetch the body of a parsed URL
    pub fn dispatch(&self, uri: &UriReference) -> Result<String, NetError> {
        let result = match uri {
            UriReference::File { path } => read_file(path),
            UriReference::Data { media_type, is_base64, payload } => {
                decode_data(media_type, *is_base64, payload)
            }
            // Raw source: the inner body is returned untouched
            UriReference::ViewSource { inner } => return self.dispatch(inner),
            UriReference::Http { .. } => self.fetch(uri).map(|response| response.text()),
        };

        match result {
            Err(err) if err.is_recoverable() => {
                tracing::debug!(url = %uri, error = %err, "reporting error as page text");
                Ok(err.to_string())
            }
            other => other,
        }
    }

    /// Fetch an `http`/`https` URL, following redirects, and return the
    /// final response
    pub fn fetch(&self, uri: &UriReference) -> Result<Http1Response, NetError> {
        self.fetch_with_redirects(uri, 0)
    }

    fn fetch_with_redirects(&self, uri: &UriReference, redirect_count: u32) -> Result<Http1Response, NetError> {
        if redirect_count > self.config.max_redirects {
            return Err(NetError::TooManyRedirects(self.config.max_redirects));
        }

        let (UriReference::Http { host, path, .. }, Some(key)) = (uri, uri.connection_key()) else {
            return Err(NetError::MalformedUri(format!("{} is not an http(s) URL", uri)));
        };

        let request = Http1Request::get(path)
            .header("Host", host)
            .header("Connection", "keep-alive")
            .header("User-Agent", &self.config.user_agent)
            .serialize();

        tracing::info!(url = %uri, "GET");
        let response = self.execute(&key, &request)?;
        tracing::debug!(url = %uri, status = response.status, bytes = response.body.len(), "response");

        // The connection is back in the pool (or closed) before the next hop
        if response.is_redirect() {
            if let Some(location) = response.redirect_location() {
                let target = uri.resolve(location)?;
                tracing::debug!(from = %uri, to = %target, redirect_count, "following redirect");
                return self.fetch_with_redirects(&target, redirect_count + 1);
            }
        }

        Ok(response)
    }

    /// One request/response exchange on a pooled or new connection
    fn execute(&self, key: &ConnectionKey, request: &[u8]) -> Result<Http1Response, NetError> {
        let (handle, mut fresh): (TransportHandle, bool) = match self.pool.acquire(key) {
            Some(handle) => (handle, false),
            None => (Arc::new(Mutex::new(self.connector.open(key)?)), true),
        };

        let mut transport = lock(&handle);

        let result = loop {
            match self.write_request(key, &mut *transport, request) {
                Ok(reconnected) => fresh |= reconnected,
                Err(err) => break Err(err),
            }

            match Http1Parser::parse(&mut *transport) {
                // The server dropped an idle keep-alive connection
                Err(NetError::EmptyResponse) if !fresh => {
                    tracing::warn!(%key, "pooled connection was closed by the server, retrying");
                    transport.close();
                    continue;
                }
                result => break result,
            }
        };

        match &result {
            Ok(response) if response.keep_alive() => {
                self.pool.store(key.clone(), Arc::clone(&handle));
            }
            _ => {
                transport.close();
                self.pool.invalidate(key);
            }
        }

        result
    }

    /// Write the request, reconnecting once if the connection went stale.
    /// Returns `true` when a new connection had to be opened.
    fn write_request(&self, key: &ConnectionKey, transport: &mut Transport, request: &[u8]) -> Result<bool, NetError> {
        write_with_reconnect(key, transport, request, |stale| {
            stale.close();
            *stale = self.connector.open(key)?;
            Ok(())
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpClient {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn is_stale_connection(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset)
}

/// Write `request`; on a stale-connection error, `reconnect` replaces the
/// transport and the write is tried once more. A second failure is final.
fn write_with_reconnect<S, F>(
    key: &ConnectionKey,
    transport: &mut Transport<S>,
    request: &[u8],
    reconnect: F,
) -> Result<bool, NetError>
where
    S: Write,
    F: FnOnce(&mut Transport<S>) -> Result<(), NetError>,
{
    match transport.write_all(request) {
        Ok(()) => Ok(false),
        Err(err) if is_stale_connection(&err) => {
            tracing::warn!(%key, error = %err, "write failed, reconnecting");
            reconnect(transport)?;
            transport.write_all(request).map_err(NetError::SocketWriteFailed)?;
            Ok(true)
        }
        Err(err) => Err(NetError::SocketWriteFailed(err)),
    }
}

fn read_file(path: &str) -> Result<String, NetError> {
    std::fs::read_to_string(path).map_err(|source| NetError::FileIo {
        path: path.to_string(),
        source,
    })
}

fn decode_data(media_type: &str, is_base64: bool, payload: &str) -> Result<String, NetError> {
    if !is_base64 {
        return Ok(percent_decode_str(payload).decode_utf8_lossy().into_owned());
    }

    let bytes = Base64::decode_vec(payload.trim()).map_err(|e| NetError::DataDecode(e.to_string()))?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => Ok(format!(
            "[Binary data: {} bytes, mediatype: {}]",
            err.as_bytes().len(),
            media_type
        )),
    }
}
