//! Multipart upload handler
//!
//! Parses a `multipart/form-data` body, stages every file field for the
//! lifetime of the request, and reports what was staged.

use futures_util::future::ready;
use futures_util::stream::once;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::config::AppState;
use crate::http;
use crate::logger;
use crate::output::{Payload, PayloadResponder};
use crate::upload::{BufferedUpload, UploadedFile};

/// Multipart body failures
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("Missing Content-Type header")]
    MissingContentType,
    #[error("Failed to parse boundary: {0}")]
    Boundary(#[source] multer::Error),
    #[error("Failed to read multipart field: {0}")]
    Field(#[source] multer::Error),
}

#[derive(Debug, Serialize)]
struct StagedEntry {
    field: String,
    filename: Option<String>,
    size: Option<u64>,
    staged: bool,
}

/// Collect the file fields of a multipart body as `(field name, upload)`
/// pairs, in body order. Text fields are skipped.
pub async fn read_file_fields(
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Vec<(String, BufferedUpload)>, MultipartError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or(MultipartError::MissingContentType)?;

    let boundary = multer::parse_boundary(content_type).map_err(MultipartError::Boundary)?;

    // multer expects a stream
    let stream = once(ready(Ok::<_, std::io::Error>(body)));
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(MultipartError::Field)? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(MultipartError::Field)?;

        let upload = if filename.is_empty() {
            BufferedUpload::anonymous(data.to_vec())
        } else {
            BufferedUpload::new(filename, data.to_vec())
        };
        files.push((name, upload));
    }

    Ok(files)
}

/// Stage the uploaded files of one request
///
/// 201 when at least one file was staged, 422 when none were. The staging
/// directory is removed before the response is sent.
pub async fn handle_upload(headers: &HeaderMap, body: Bytes, state: &AppState) -> Response<Full<Bytes>> {
    let mut files = match read_file_fields(headers, body).await {
        Ok(files) => files,
        Err(e) => {
            logger::log_warning(&format!("Rejected upload: {e}"));
            return http::build_400_response(&e.to_string());
        }
    };

    let filenames: Vec<Option<String>> = files
        .iter()
        .map(|(_, upload)| upload.client_filename().map(str::to_string))
        .collect();

    let mut staging = state.upload_staging();
    let staged = staging.materialize_all(
        files
            .iter_mut()
            .map(|(name, upload)| (name.as_str(), upload)),
    );

    let entries: Vec<StagedEntry> = staged
        .into_iter()
        .zip(filenames)
        .map(|((field, staged), filename)| StagedEntry {
            size: staged
                .as_ref()
                .and_then(|s| std::fs::metadata(&s.path).ok())
                .map(|meta| meta.len()),
            staged: staged.is_some(),
            field,
            filename,
        })
        .collect();

    let payload = summarize(&entries);
    upload_responder()
        .respond(Some(&payload))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Upload response failed: {e}"));
            http::response::build_text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            )
        })
}

fn summarize(entries: &[StagedEntry]) -> Payload {
    let staged = entries.iter().filter(|e| e.staged).count();
    let status = if staged > 0 { "created" } else { "not_accepted" };

    Payload::new(status)
        .with_output(serde_json::json!({ "files": entries }))
        .with_messages(format!("{staged} of {} file(s) staged", entries.len()))
}

fn upload_responder() -> PayloadResponder {
    PayloadResponder::new()
        .on("created", |p| http::build_json_response(StatusCode::CREATED, p))
        .on("not_accepted", |p| {
            http::build_json_response(StatusCode::UNPROCESSABLE_ENTITY, p)
        })
}
