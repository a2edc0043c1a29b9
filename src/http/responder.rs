//! Range file responder module
//!
//! Decides whether a file is served whole or as a single byte range, and
//! computes the status, headers, and body span. Pure computation: no bytes of
//! the resource are read here, see [`crate::http::emit`] for that.

use chrono::{DateTime, Utc};
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    LAST_MODIFIED,
};
use hyper::StatusCode;

use super::range::{parse_range_header, RangeError, RangeSpec};

/// `Last-Modified` format, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Read-only view of a resource that may be served
pub trait FileHandle {
    fn exists(&self) -> bool;
    fn size_in_bytes(&self) -> u64;
    fn last_modified(&self) -> DateTime<Utc>;
    fn mime_type(&self) -> &str;
}

/// Outcome of a file request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    PartialContent,
    RangeNotSatisfiable,
    NotFound,
}

impl ResponseStatus {
    pub const fn code(self) -> StatusCode {
        match self {
            Self::Ok => StatusCode::OK,
            Self::PartialContent => StatusCode::PARTIAL_CONTENT,
            Self::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// Region of the resource to emit
///
/// `length` is signed: a descending range produces a negative length and is
/// passed through as computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodySpan {
    pub offset: u64,
    pub length: i128,
}

impl BodySpan {
    /// Number of bytes an emitter can actually send for this span
    pub fn emittable_len(&self) -> u64 {
        u64::try_from(self.length).unwrap_or(0)
    }
}

/// Status, headers, and body span for one file request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: ResponseStatus,
    pub headers: HeaderMap,
    pub body: Option<BodySpan>,
}

impl ResponseDescriptor {
    fn not_found() -> Self {
        Self {
            status: ResponseStatus::NotFound,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Header value as a string, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Format a timestamp as an HTTP date
pub fn format_http_date(time: &DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Resolve a file request into a response descriptor
///
/// A `start` equal to the resource size is accepted and yields an empty
/// span; only `start > size` is unsatisfiable. Descending ranges are not
/// rejected.
pub fn resolve(file: &impl FileHandle, range: Option<&RangeSpec>) -> ResponseDescriptor {
    if !file.exists() {
        return ResponseDescriptor::not_found();
    }

    let size = file.size_in_bytes();
    let mut descriptor = base_descriptor(file, size);

    let Some(range) = range else {
        return descriptor;
    };

    if range.start > size {
        descriptor.status = ResponseStatus::RangeNotSatisfiable;
        descriptor.headers.remove(CONTENT_LENGTH);
        descriptor
            .headers
            .insert(CONTENT_RANGE, header_value(&format!("bytes */{size}")));
        descriptor.body = None;
        return descriptor;
    }

    let end = range.end_position(size);
    let length = range.content_length(size);

    descriptor.status = ResponseStatus::PartialContent;
    descriptor.headers.insert(
        CONTENT_RANGE,
        header_value(&format!("bytes {}-{end}/{size}", range.start)),
    );
    descriptor
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(length_header(length)));
    descriptor.body = Some(BodySpan {
        offset: range.start,
        length,
    });

    descriptor
}

/// Parse the raw `Range` header (if any) and resolve the request
///
/// A missing resource short-circuits before the header is looked at.
pub fn respond_with_file(
    file: &impl FileHandle,
    range_header: Option<&str>,
) -> Result<ResponseDescriptor, RangeError> {
    if !file.exists() {
        return Ok(ResponseDescriptor::not_found());
    }

    let range = range_header.map(parse_range_header).transpose()?;
    Ok(resolve(file, range.as_ref()))
}

fn base_descriptor(file: &impl FileHandle, size: u64) -> ResponseDescriptor {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CONTENT_TYPE, header_value(file.mime_type()));
    headers.insert(
        LAST_MODIFIED,
        header_value(&format_http_date(&file.last_modified())),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));

    ResponseDescriptor {
        status: ResponseStatus::Ok,
        headers,
        body: Some(BodySpan {
            offset: 0,
            length: i128::from(size),
        }),
    }
}

/// Content-Length values always fit i64 for u64-sized resources
fn length_header(length: i128) -> i64 {
    i64::try_from(length).unwrap_or(i64::MAX)
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
