//! Request handler module
//!
//! Responsible for request routing dispatch and file serving.
//! Configured file routes are answered through the byte-range responder;
//! multipart uploads are staged per request.

pub mod router;
pub mod static_files;
pub mod uploads;

// Re-export main entry point
pub use router::handle_request;
