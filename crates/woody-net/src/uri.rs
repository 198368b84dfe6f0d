//! URI references
//!
//! Splits a URL string into one variant per supported scheme. Parsing does
//! no I/O; fetching lives in [`crate::client`].

use std::fmt;

use crate::connection_pool::ConnectionKey;
use crate::NetError;

/// Default port for `http://`
pub const HTTP_DEFAULT_PORT: u16 = 80;
/// Default port for `https://`
pub const HTTPS_DEFAULT_PORT: u16 = 443;

/// Media type of a `data:` URL with an empty header
const DATA_DEFAULT_MEDIA_TYPE: &str = "text/plain;charset=US-ASCII";
/// Media type of a `data:` URL without a comma
const DATA_BARE_MEDIA_TYPE: &str = "text/plain";

/// URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    File,
    Data,
    ViewSource,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::Data => "data",
            Scheme::ViewSource => "view-source",
        }
    }

    /// Port used when the authority has none
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Scheme::Http => Some(HTTP_DEFAULT_PORT),
            Scheme::Https => Some(HTTPS_DEFAULT_PORT),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed URL, one variant per scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriReference {
    /// `http://` or `https://` (`secure`)
    Http {
        host: String,
        port: u16,
        path: String,
        secure: bool,
    },
    /// `file://` path, taken verbatim
    File { path: String },
    /// `data:[mediatype][;base64],payload`
    Data {
        media_type: String,
        is_base64: bool,
        payload: String,
    },
    /// `view-source:` wrapping another URL
    ViewSource { inner: Box<UriReference> },
}

impl UriReference {
    /// Parse a URL string
    pub fn parse(raw: &str) -> Result<Self, NetError> {
        if let Some(rest) = raw.strip_prefix("view-source:") {
            let inner = Self::parse(rest)?;
            return Ok(Self::ViewSource { inner: Box::new(inner) });
        }

        if let Some(rest) = raw.strip_prefix("data:") {
            return Ok(Self::parse_data(rest));
        }

        // `file:/path` without the authority slashes
        if let Some(rest) = raw.strip_prefix("file:") {
            if !rest.starts_with("//") {
                return Ok(Self::File { path: rest.to_string() });
            }
        }

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| NetError::MalformedUri(format!("no scheme in {:?}", raw)))?;

        match scheme {
            "http" => Self::parse_http(rest, false),
            "https" => Self::parse_http(rest, true),
            "file" => Ok(Self::File { path: rest.to_string() }),
            other => Err(NetError::MalformedUri(format!("unsupported scheme {:?}", other))),
        }
    }

    fn parse_http(rest: &str, secure: bool) -> Result<Self, NetError> {
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, format!("/{}", path)),
            None => (rest, "/".to_string()),
        };

        // Fragments never go on the wire
        let path = match path.split_once('#') {
            Some((path, _)) => path.to_string(),
            None => path,
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .ok()
                    .filter(|&p| p != 0)
                    .ok_or_else(|| NetError::MalformedUri(format!("invalid port {:?}", port)))?;
                (host, port)
            }
            None if secure => (authority, HTTPS_DEFAULT_PORT),
            None => (authority, HTTP_DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(NetError::MalformedUri(format!("empty host in {:?}", rest)));
        }

        Ok(Self::Http {
            host: host.to_string(),
            port,
            path,
            secure,
        })
    }

    fn parse_data(rest: &str) -> Self {
        let Some((header, payload)) = rest.split_once(',') else {
            return Self::Data {
                media_type: DATA_BARE_MEDIA_TYPE.to_string(),
                is_base64: false,
                payload: rest.to_string(),
            };
        };

        // `base64` must be a whole `;` parameter, not a substring of one
        let is_base64 = header.contains(';') && header.split(';').any(|t| t.trim() == "base64");
        let media_type = if is_base64 {
            header.split(';').next().unwrap_or_default()
        } else if header.is_empty() {
            DATA_DEFAULT_MEDIA_TYPE
        } else {
            header
        };

        Self::Data {
            media_type: media_type.to_string(),
            is_base64,
            payload: payload.to_string(),
        }
    }

    /// Scheme of this reference
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Http { secure: true, .. } => Scheme::Https,
            Self::Http { .. } => Scheme::Http,
            Self::File { .. } => Scheme::File,
            Self::Data { .. } => Scheme::Data,
            Self::ViewSource { .. } => Scheme::ViewSource,
        }
    }

    /// Pool key for `http`/`https` references
    pub fn connection_key(&self) -> Option<ConnectionKey> {
        match self {
            Self::Http { host, port, .. } => Some(ConnectionKey::new(self.scheme(), host, *port)),
            _ => None,
        }
    }

    /// Resolve a redirect `Location` against this reference.
    ///
    /// Absolute `http(s)://` locations are taken as they are. A location
    /// starting with `/` replaces the path; anything else is relative to the
    /// directory of the current path.
    pub fn resolve(&self, location: &str) -> Result<Self, NetError> {
        let Self::Http { host, port, path, .. } = self else {
            return Err(NetError::MalformedUri(format!(
                "cannot resolve {:?} against {}",
                location, self
            )));
        };

        if location.starts_with("http://") || location.starts_with("https://") {
            return Self::parse(location);
        }

        let scheme = self.scheme();
        let target = if let Some(network_path) = location.strip_prefix("//") {
            format!("{}://{}", scheme, network_path)
        } else if location.starts_with('/') {
            format!("{}://{}{}", scheme, authority(scheme, host, *port), location)
        } else {
            let dir_end = path.rfind('/').map_or(0, |i| i + 1);
            format!(
                "{}://{}{}{}",
                scheme,
                authority(scheme, host, *port),
                &path[..dir_end],
                location
            )
        };

        Self::parse(&target)
    }
}

/// `host` or `host:port` when the port is not the scheme default
fn authority(scheme: Scheme, host: &str, port: u16) -> String {
    if scheme.default_port() == Some(port) {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

impl fmt::Display for UriReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { host, port, path, .. } => {
                let scheme = self.scheme();
                write!(f, "{}://{}{}", scheme, authority(scheme, host, *port), path)
            }
            Self::File { path } => write!(f, "file://{}", path),
            Self::Data { media_type, is_base64, payload } => {
                let header = if !is_base64 && media_type == DATA_DEFAULT_MEDIA_TYPE {
                    ""
                } else {
                    media_type.as_str()
                };
                let base64 = if *is_base64 { ";base64" } else { "" };
                write!(f, "data:{}{},{}", header, base64, payload)
            }
            Self::ViewSource { inner } => write!(f, "view-source:{}", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(url: &str) -> (String, u16, String, bool) {
        match UriReference::parse(url).unwrap() {
            UriReference::Http { host, port, path, secure } => (host, port, path, secure),
            other => panic!("expected http, got {:?}", other),
        }
    }

    #[test]
    fn test_http_defaults() {
        let (host, port, path, secure) = http("http://example.org/index.html");
        assert_eq!(host, "example.org");
        assert_eq!(port, 80);
        assert_eq!(path, "/index.html");
        assert!(!secure);
    }

    #[test]
    fn test_https_default_port_and_root_path() {
        let (host, port, path, secure) = http("https://example.org");
        assert_eq!(host, "example.org");
        assert_eq!(port, 443);
        assert_eq!(path, "/");
        assert!(secure);
    }

    #[test]
    fn test_explicit_port() {
        let (host, port, path, _) = http("http://localhost:8080/a/b?q=1");
        assert_eq!(host, "localhost");
        assert_eq!(port, 8080);
        assert_eq!(path, "/a/b?q=1");
    }

    #[test]
    fn test_fragment_dropped() {
        let (_, _, path, _) = http("http://example.org/page#section");
        assert_eq!(path, "/page");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(UriReference::parse("example.org"), Err(NetError::MalformedUri(_))));
        assert!(matches!(UriReference::parse("ftp://example.org/"), Err(NetError::MalformedUri(_))));
        assert!(matches!(UriReference::parse("http:///path"), Err(NetError::MalformedUri(_))));
        assert!(matches!(UriReference::parse("http://host:0/"), Err(NetError::MalformedUri(_))));
        assert!(matches!(UriReference::parse("http://host:99999/"), Err(NetError::MalformedUri(_))));
        assert!(matches!(UriReference::parse("VIEW-SOURCE:http://a/"), Err(NetError::MalformedUri(_))));
    }

    #[test]
    fn test_file() {
        assert_eq!(
            UriReference::parse("file:///tmp/page.html").unwrap(),
            UriReference::File { path: "/tmp/page.html".into() }
        );
        assert_eq!(
            UriReference::parse("file:/tmp/page.html").unwrap(),
            UriReference::File { path: "/tmp/page.html".into() }
        );
    }

    #[test]
    fn test_data_plain() {
        assert_eq!(
            UriReference::parse("data:text/html,<b>hi</b>").unwrap(),
            UriReference::Data {
                media_type: "text/html".into(),
                is_base64: false,
                payload: "<b>hi</b>".into(),
            }
        );
    }

    #[test]
    fn test_data_default_media_type() {
        assert_eq!(
            UriReference::parse("data:,hello").unwrap(),
            UriReference::Data {
                media_type: "text/plain;charset=US-ASCII".into(),
                is_base64: false,
                payload: "hello".into(),
            }
        );
    }

    #[test]
    fn test_data_base64() {
        assert_eq!(
            UriReference::parse("data:text/plain;base64,aGk=").unwrap(),
            UriReference::Data {
                media_type: "text/plain".into(),
                is_base64: true,
                payload: "aGk=".into(),
            }
        );
    }

    #[test]
    fn test_data_base64_after_other_parameters() {
        assert_eq!(
            UriReference::parse("data:text/plain;charset=utf-8;base64,aGk=").unwrap(),
            UriReference::Data {
                media_type: "text/plain".into(),
                is_base64: true,
                payload: "aGk=".into(),
            }
        );
    }

    #[test]
    fn test_data_base64_substring_is_not_a_flag() {
        let UriReference::Data { media_type, is_base64, .. } =
            UriReference::parse("data:text/plain;name=base64.txt,aGk=").unwrap()
        else {
            panic!("expected data URL");
        };
        assert!(!is_base64);
        assert_eq!(media_type, "text/plain;name=base64.txt");
    }

    #[test]
    fn test_data_without_comma() {
        assert_eq!(
            UriReference::parse("data:just text").unwrap(),
            UriReference::Data {
                media_type: "text/plain".into(),
                is_base64: false,
                payload: "just text".into(),
            }
        );
    }

    #[test]
    fn test_data_payload_keeps_later_commas() {
        match UriReference::parse("data:,a,b,c").unwrap() {
            UriReference::Data { payload, .. } => assert_eq!(payload, "a,b,c"),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_view_source() {
        let uri = UriReference::parse("view-source:http://example.org/x").unwrap();
        assert_eq!(uri.scheme(), Scheme::ViewSource);
        match uri {
            UriReference::ViewSource { inner } => {
                assert_eq!(inner.scheme(), Scheme::Http);
                assert_eq!(inner.to_string(), "http://example.org/x");
            }
            other => panic!("expected view-source, got {:?}", other),
        }
    }

    #[test]
    fn test_display_reproduces_request_target() {
        for url in [
            "http://example.org/",
            "http://example.org:8080/a/b",
            "https://example.org/index.html?x=1",
            "https://example.org:8443/",
            "view-source:http://example.org/x",
            "data:text/html,<p>",
            "data:,hello",
            "data:image/png;base64,AAAA",
        ] {
            let uri = UriReference::parse(url).unwrap();
            assert_eq!(uri.to_string(), url);
            assert_eq!(UriReference::parse(&uri.to_string()).unwrap(), uri);
        }
    }

    #[test]
    fn test_connection_key() {
        let key = UriReference::parse("https://example.org:8443/x")
            .unwrap()
            .connection_key()
            .unwrap();
        assert_eq!(key, ConnectionKey::new(Scheme::Https, "example.org", 8443));
        assert!(UriReference::parse("data:,x").unwrap().connection_key().is_none());
    }

    #[test]
    fn test_resolve_absolute() {
        let base = UriReference::parse("http://example.org/old/page").unwrap();
        assert_eq!(
            base.resolve("https://other.org/new").unwrap().to_string(),
            "https://other.org/new"
        );
    }

    #[test]
    fn test_resolve_path_absolute() {
        let base = UriReference::parse("http://example.org/old/page").unwrap();
        assert_eq!(base.resolve("/new/path").unwrap().to_string(), "http://example.org/new/path");

        let base = UriReference::parse("http://localhost:8080/old/page").unwrap();
        assert_eq!(base.resolve("/new").unwrap().to_string(), "http://localhost:8080/new");
    }

    #[test]
    fn test_resolve_relative() {
        let base = UriReference::parse("http://localhost:8080/docs/a/page.html").unwrap();
        assert_eq!(
            base.resolve("other.html").unwrap().to_string(),
            "http://localhost:8080/docs/a/other.html"
        );

        let base = UriReference::parse("https://example.org/").unwrap();
        assert_eq!(base.resolve("x").unwrap().to_string(), "https://example.org/x");
    }

    #[test]
    fn test_resolve_network_path() {
        let base = UriReference::parse("https://example.org/a").unwrap();
        assert_eq!(base.resolve("//cdn.example.org/b").unwrap().to_string(), "https://cdn.example.org/b");
    }

    #[test]
    fn test_resolve_requires_http_base() {
        let base = UriReference::parse("file:///tmp/x").unwrap();
        assert!(base.resolve("/y").is_err());
    }
}
