//! Logger module
//!
//! Provides logging utilities for the HTTP server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Range decision logging
//! - Error and warning logging, optionally to files

mod format;
pub mod level;
pub mod writer;

pub use format::AccessLogEntry;
pub use level::LogLevel;

use crate::config::Config;
use crate::http::ResponseDescriptor;
use hyper::{Method, Uri, Version};
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup. Fails on an unknown
/// `logging.level`.
pub fn init(config: &Config) -> std::io::Result<()> {
    let max_level = config
        .logging
        .level
        .parse::<LogLevel>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    level::set_max_level(max_level);

    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Write to info/access log, if info messages are enabled
pub fn write_info(message: &str) {
    if !level::enabled(LogLevel::Info) {
        return;
    }
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

/// Write to error log
pub fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    write_info("======================================");
    write_info("Range file server started");
    write_info(&format!("Listening on: http://{addr}"));
    write_info(&format!("Log level: {}", config.logging.level));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    for (prefix, route) in &config.routes.files {
        write_info(&format!("Route: {prefix} -> {route:?}"));
    }
    if let Some(ref path) = config.uploads.path {
        write_info(&format!("Upload route: POST {path}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================\n");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write_info(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(&format!("[ERROR] Failed to serve connection: {err:?}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    if !level::enabled(LogLevel::Warn) {
        return;
    }
    write_error(&format!("[WARN] {message}"));
}

pub fn log_request(method: &Method, uri: &Uri, version: Version) {
    write_info(&format!("[Request] {method} {uri} {version:?}"));
}

pub fn log_headers_count(count: usize, show: bool) {
    if show {
        write_info(&format!("[Headers] Count: {count}"));
    }
}

/// Log how a file request was resolved
pub fn log_range_decision(range_header: Option<&str>, descriptor: &ResponseDescriptor) {
    let content_range = descriptor.header("content-range").unwrap_or("-");
    write_info(&format!(
        "[Range] {} -> {} length={} range={content_range}",
        range_header.unwrap_or("-"),
        descriptor.status.code().as_u16(),
        descriptor.header("content-length").unwrap_or("-"),
    ));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    match writer::get() {
        Some(w) => w.write_access(&entry.format(format)),
        None => println!("{}", entry.format(format)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_rejects_unknown_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::load_from(dir.path().join("absent").to_str().unwrap()).unwrap();
        cfg.logging.level = "loud".to_string();

        let err = init(&cfg).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
