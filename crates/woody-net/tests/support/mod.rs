//! Scripted HTTP/1.1 server for integration tests
//!
//! Accepts connections on a loopback port and answers every request with
//! whatever the handler returns. Each connection is served on its own thread
//! and kept open until the handler asks to hang up or the client leaves.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// What the server sends back for one request
pub struct Reply {
    pub raw: Vec<u8>,
    pub hang_up: bool,
}

impl Reply {
    /// Kept-alive 200 with a Content-Length body
    pub fn ok(body: &str) -> Self {
        Self::raw(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ))
    }

    /// 200 with `Connection: close`; the server hangs up afterwards
    pub fn close(body: &str) -> Self {
        Self::raw(format!(
            "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ))
        .then_hang_up()
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::raw(format!(
            "HTTP/1.1 {} Found\r\nLocation: {}\r\nContent-Length: 0\r\n\r\n",
            status, location
        ))
    }

    pub fn raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: raw.into(),
            hang_up: false,
        }
    }

    pub fn then_hang_up(mut self) -> Self {
        self.hang_up = true;
        self
    }
}

/// A request as the server saw it
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub connection: usize,
    pub request_line: String,
    pub headers: Vec<String>,
}

impl SeenRequest {
    pub fn path(&self) -> &str {
        self.request_line.split(' ').nth(1).unwrap_or("")
    }
}

pub struct MockServer {
    port: u16,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&SeenRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        {
            let accepted = Arc::clone(&accepted);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    let connection = accepted.fetch_add(1, Ordering::SeqCst) + 1;
                    let requests = Arc::clone(&requests);
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || serve(stream, connection, &*handler, &requests));
                }
            });
        }

        Self {
            port,
            accepted,
            requests,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(
    stream: TcpStream,
    connection: usize,
    handler: &(dyn Fn(&SeenRequest) -> Reply + Send + Sync),
    requests: &Mutex<Vec<SeenRequest>>,
) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        match reader.read_line(&mut request_line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            headers.push(line);
        }

        let seen = SeenRequest {
            connection,
            request_line: request_line.trim_end().to_string(),
            headers,
        };
        requests.lock().unwrap().push(seen.clone());

        let reply = handler(&seen);
        if writer.write_all(&reply.raw).is_err() {
            return;
        }
        let _ = writer.flush();

        if reply.hang_up {
            let _ = writer.shutdown(Shutdown::Both);
            return;
        }
    }
}
