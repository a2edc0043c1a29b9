//! Response emission module
//!
//! Turns a [`ResponseDescriptor`] into a hyper response, reading only the
//! byte span the descriptor names.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_LENGTH};
use hyper::Response;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::responder::{BodySpan, ResponseDescriptor, ResponseStatus};
use super::response::{build_404_response, log_build_error};
use crate::logger;

/// Emit a descriptor for the file at `path`
///
/// HEAD requests keep every header and send no body. If the bytes available
/// on disk disagree with the descriptor's `Content-Length` (descending or
/// past-EOF ranges), the header is corrected to what is actually sent.
pub async fn emit(descriptor: ResponseDescriptor, path: &Path, is_head: bool) -> Response<Full<Bytes>> {
    let ResponseDescriptor {
        status,
        mut headers,
        body,
    } = descriptor;

    if status == ResponseStatus::NotFound {
        return build_404_response();
    }

    // HEAD only needs the length that would be sent
    let (sent_len, data) = match body {
        Some(span) => {
            let sent = if is_head {
                sendable_len(path, span).await.map(|len| (len, Bytes::new()))
            } else {
                read_span(path, span)
                    .await
                    .map(|data| (u64::try_from(data.len()).unwrap_or(u64::MAX), data))
            };
            match sent {
                Ok(sent) => sent,
                Err(e) => {
                    logger::log_error(&format!(
                        "Failed to read '{}' at {}+{}: {e}",
                        path.display(),
                        span.offset,
                        span.length
                    ));
                    return build_404_response();
                }
            }
        }
        None => (0, Bytes::new()),
    };

    if body.is_some() && headers.get(CONTENT_LENGTH) != Some(&HeaderValue::from(sent_len)) {
        logger::log_warning(&format!(
            "Content-Length {:?} does not match {sent_len} emittable bytes of '{}'",
            headers.get(CONTENT_LENGTH),
            path.display()
        ));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(sent_len));
    }

    let mut builder = Response::builder().status(status.code());
    if let Some(h) = builder.headers_mut() {
        h.extend(headers);
    }
    builder.body(Full::new(data)).unwrap_or_else(|e| {
        log_build_error(status.code().as_str(), &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Bytes of `span` that exist on disk, without reading them
async fn sendable_len(path: &Path, span: BodySpan) -> std::io::Result<u64> {
    let size = tokio::fs::metadata(path).await?.len();
    Ok(size.saturating_sub(span.offset).min(span.emittable_len()))
}

/// Read `span` from `path`, stopping early at end of file
async fn read_span(path: &Path, span: BodySpan) -> std::io::Result<Bytes> {
    let len = span.emittable_len();
    if len == 0 {
        return Ok(Bytes::new());
    }

    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(span.offset)).await?;

    let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or(0).min(1 << 20));
    file.take(len).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}
