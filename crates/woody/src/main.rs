//! woody - Main Entry Point
//!
//! `woody <url>` fetches a URL and prints it as text.

use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use woody_net::{text, HttpClient, UriReference};

fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging; stdout is reserved for the page
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Some(url) = std::env::args().nth(1) else {
        eprintln!("usage: woody <url>");
        return Ok(ExitCode::from(2));
    };

    let uri = UriReference::parse(&url)?;
    let client = HttpClient::new();

    let body = client
        .dispatch(&uri)
        .with_context(|| format!("failed to load {}", url))?;

    println!("{}", text::render(&uri, &body));
    tracing::debug!(pooled = client.pool().len(), "done");

    Ok(ExitCode::SUCCESS)
}
