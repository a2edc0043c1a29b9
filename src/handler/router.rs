//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method validation, route matching, and dispatching.

use crate::config::{AppState, FileRoute, RoutesConfig, UploadConfig};
use crate::handler::{static_files, uploads};
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, RANGE, REFERER, USER_AGENT};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub range_header: Option<String>,
    pub access_log: bool,
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let access_log = state.cached_access_log.load(Ordering::Relaxed);
    if access_log {
        logger::log_request(&parts.method, &parts.uri, parts.version);
    }

    let response = process_request(&parts, body, &state, access_log).await;

    if access_log {
        let entry = build_access_entry(&parts, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

async fn process_request<B>(
    parts: &Parts,
    body: B,
    state: &AppState,
    access_log: bool,
) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let method = &parts.method;
    let path = parts.uri.path();
    let max_body_size = state.config.http.max_body_size;

    // 1. Uploads are the only requests with a body
    if *method == Method::POST && is_upload_route(&state.config.uploads, path) {
        if let Some(resp) = check_body_size(&parts.headers, max_body_size) {
            return resp;
        }
        return match read_body(body, max_body_size).await {
            Ok(bytes) => uploads::handle_upload(&parts.headers, bytes, state).await,
            Err(resp) => resp,
        };
    }

    // 2. Check HTTP method
    if let Some(resp) = check_http_method(method, state.config.http.enable_cors) {
        return resp;
    }

    // 3. Check body size
    if let Some(resp) = check_body_size(&parts.headers, max_body_size) {
        return resp;
    }

    // 4. Log headers if enabled
    logger::log_headers_count(parts.headers.len(), state.config.logging.show_headers);

    // 5. Extract the Range header and dispatch
    let ctx = RequestContext {
        path,
        is_head: *method == Method::HEAD,
        range_header: range_header(&parts.headers),
        access_log,
    };

    route_request(&ctx, &state.config.routes, state).await
}

fn is_upload_route(uploads: &UploadConfig, path: &str) -> bool {
    uploads.path.as_deref() == Some(path)
}

/// Collect the request body, refusing more than `max_body_size` bytes
async fn read_body<B>(body: B, max_body_size: u64) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_error(&format!(
                "Request body too large (max: {max_body_size})"
            ));
            Err(http::build_413_response())
        }
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            Err(http::build_400_response("unreadable request body"))
        }
    }
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<Full<Bytes>>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response(enable_cors)),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = headers.get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Route request based on path and configuration
async fn route_request(
    ctx: &RequestContext<'_>,
    routes: &RoutesConfig,
    state: &AppState,
) -> Response<Full<Bytes>> {
    // Health check endpoints (highest priority, always fast)
    if routes.health.enabled
        && (ctx.path == routes.health.liveness_path || ctx.path == routes.health.readiness_path)
    {
        return http::build_health_response("ok");
    }

    if let Some((prefix, route)) = match_file_route(routes, ctx.path) {
        return match route {
            FileRoute::Dir { path } => {
                static_files::serve_directory(ctx, path, prefix, &routes.index_files).await
            }
            FileRoute::File { path } => static_files::serve_file(ctx, path).await,
        };
    }

    if ctx.path == "/" {
        let listed = routes.files.keys().map(String::as_str).collect();
        return static_files::serve_homepage(ctx, &state.views, &state.config.http.server_name, listed);
    }

    http::build_404_response()
}

/// Find the route for `path`: an exact match first, then the longest
/// directory prefix that ends on a path segment boundary
pub fn match_file_route<'a>(routes: &'a RoutesConfig, path: &str) -> Option<(&'a str, &'a FileRoute)> {
    if let Some((prefix, route)) = routes.files.get_key_value(path) {
        return Some((prefix.as_str(), route));
    }

    routes
        .files
        .iter()
        .filter(|(_, route)| matches!(route, FileRoute::Dir { .. }))
        .filter(|(prefix, _)| is_segment_prefix(prefix, path))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, route)| (prefix.as_str(), route))
}

fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn header_string(headers: &HeaderMap, name: &hyper::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// The raw Range value; bytes outside visible ASCII are replaced rather
/// than dropped, so the parser still sees the header
fn range_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(RANGE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

fn build_access_entry(
    parts: &Parts,
    response: &Response<Full<Bytes>>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        parts.method.to_string(),
        parts.uri.path().to_string(),
    );
    entry.query = parts.uri.query().map(ToString::to_string);
    entry.http_version = format!("{:?}", parts.version)
        .trim_start_matches("HTTP/")
        .to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    entry.range = range_header(&parts.headers);
    entry.referer = header_string(&parts.headers, &REFERER);
    entry.user_agent = header_string(&parts.headers, &USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handler::static_files::{HOMEPAGE_SOURCE, HOMEPAGE_TEMPLATE};
    use crate::output::ViewResponder;
    use hyper::header::HeaderValue;
    use hyper::StatusCode;

    struct Fixture {
        dir: tempfile::TempDir,
        state: Arc<AppState>,
    }

    impl Fixture {
        fn staging_root(&self) -> std::path::PathBuf {
            self.dir.path().join("staging")
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(&media).unwrap();
        std::fs::write(media.join("clip.mp4"), b"0123456789").unwrap();
        let single = dir.path().join("notes.txt");
        std::fs::write(&single, b"hello").unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();

        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[logging]
access_log = false

[http]
max_body_size = 1024

[routes.files."/media"]
type = "dir"
path = "{}"

[routes.files."/notes"]
type = "file"
path = "{}"

[uploads]
path = "/upload"
temp_dir = "{}"
"#,
                media.display(),
                single.display(),
                staging.display()
            ),
        )
        .unwrap();

        let cfg = Config::load_from(config_path.to_str().unwrap()).unwrap();
        let views = ViewResponder::from_templates([(HOMEPAGE_TEMPLATE, HOMEPAGE_SOURCE)]).unwrap();
        Fixture {
            dir,
            state: Arc::new(AppState::new(&cfg, views)),
        }
    }

    async fn send(fx: &Fixture, req: Request<Full<Bytes>>) -> (StatusCode, HeaderMap, Bytes) {
        let resp = handle_request(req, Arc::clone(&fx.state), "127.0.0.1:40000".parse().unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    async fn call(
        fx: &Fixture,
        method: Method,
        path: &str,
        range: Option<&str>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(r) = range {
            builder = builder.header("Range", r);
        }
        send(fx, builder.body(Full::new(Bytes::new())).unwrap()).await
    }

    async fn call_raw_range(fx: &Fixture, path: &str, range: &[u8]) -> (StatusCode, HeaderMap, Bytes) {
        let req = Request::builder()
            .uri(path)
            .header("Range", HeaderValue::from_bytes(range).unwrap())
            .body(Full::new(Bytes::new()))
            .unwrap();
        send(fx, req).await
    }

    fn multipart_request(path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_file() {
        let fx = fixture();
        let (status, headers, body) = call(&fx, Method::GET, "/media/clip.mp4", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "video/mp4");
        assert_eq!(headers["accept-ranges"], "bytes");
        assert!(headers.contains_key("last-modified"));
        assert_eq!(&body[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_range_request() {
        let fx = fixture();
        let (status, headers, body) =
            call(&fx, Method::GET, "/media/clip.mp4", Some("bytes=3-6")).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers["content-range"], "bytes 3-6/10");
        assert_eq!(&body[..], b"3456");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let fx = fixture();
        let (status, headers, body) =
            call(&fx, Method::GET, "/notes", Some("bytes=6-")).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers["content-range"], "bytes */5");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_range_is_bad_request() {
        let fx = fixture();
        let (status, _, _) = call(&fx, Method::GET, "/notes", Some("bytes=-2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_ascii_range_header_is_still_parsed() {
        let fx = fixture();

        let (status, _, body) = call_raw_range(&fx, "/notes", b"\xff").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_ne!(&body[..], b"hello");

        let (status, headers, body) = call_raw_range(&fx, "/notes", b"bytes=2-4\xff").await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers["content-range"], "bytes 2-4/5");
        assert_eq!(&body[..], b"llo");
    }

    #[tokio::test]
    async fn test_missing_file_ignores_range() {
        let fx = fixture();
        let (status, _, _) = call(&fx, Method::GET, "/media/none.mp4", Some("bytes=x")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_request() {
        let fx = fixture();
        let (status, headers, body) = call(&fx, Method::HEAD, "/notes", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-length"], "5");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let fx = fixture();
        let (status, _, _) = call(&fx, Method::POST, "/notes", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _, _) = call(&fx, Method::PUT, "/upload", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_upload_stages_files_and_cleans_up() {
        let fx = fixture();
        let body = "--XYZ\r\n\
Content-Disposition: form-data; name=\"doc\"; filename=\"report.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
hello upload\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\r\n\
just text\r\n\
--XYZ--\r\n";

        let (status, headers, body) = send(&fx, multipart_request("/upload", body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers["content-type"], "application/json");

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "created");
        let files = json["output"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["field"], "doc");
        assert_eq!(files[0]["filename"], "report.txt");
        assert_eq!(files[0]["size"], 12);
        assert_eq!(files[0]["staged"], true);

        // The per-request staging directory is gone once the response is built
        assert_eq!(std::fs::read_dir(fx.staging_root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_without_files_is_not_accepted() {
        let fx = fixture();
        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\ntext\r\n--XYZ--\r\n";
        let (status, _, body) = send(&fx, multipart_request("/upload", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["messages"], "0 of 0 file(s) staged");
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_bodies() {
        let fx = fixture();

        let req = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from_static(b"nope")))
            .unwrap();
        let (status, _, _) = send(&fx, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let oversized = "x".repeat(2048);
        let (status, _, _) = send(&fx, multipart_request("/upload", &oversized)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_health_and_homepage() {
        let fx = fixture();
        let (status, _, body) = call(&fx, Method::GET, "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");

        let (status, headers, _) = call(&fx, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "text/html; charset=utf-8");

        let (status, _, _) = call(&fx, Method::GET, "/elsewhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_match_file_route() {
        let fx = fixture();
        let routes = &fx.state.config.routes;
        assert_eq!(match_file_route(routes, "/media/a/b.mp4").map(|(p, _)| p), Some("/media"));
        assert_eq!(match_file_route(routes, "/notes").map(|(p, _)| p), Some("/notes"));
        assert!(match_file_route(routes, "/mediax/a.mp4").is_none());
        // File routes only match exactly
        assert!(match_file_route(routes, "/notes/more").is_none());
    }
}
