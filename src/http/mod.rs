//! HTTP protocol layer module
//!
//! Range parsing, the range file responder, MIME lookup, and the builders that
//! turn decisions into hyper responses. Nothing here knows about routing.

pub mod emit;
pub mod mime;
pub mod range;
pub mod responder;
pub mod response;

// Re-export commonly used types
pub use emit::emit;
pub use range::{parse_range_header, RangeError, RangeSpec};
pub use responder::{
    resolve, respond_with_file, BodySpan, FileHandle, ResponseDescriptor, ResponseStatus,
};
pub use response::{
    build_204_response, build_400_response, build_404_response, build_405_response,
    build_413_response, build_health_response, build_html_response, build_json_response,
    build_options_response,
};
