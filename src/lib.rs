//! Byte-range file server
//!
//! Serves configured files and directories over HTTP/1.1, answering
//! `Range: bytes=start-end` requests with partial content.

pub mod config;
pub mod files;
pub mod handler;
pub mod http;
pub mod logger;
pub mod output;
pub mod server;
pub mod upload;
