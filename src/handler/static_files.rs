//! Static file serving module
//!
//! Maps request paths onto files and serves them through the range responder.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::files::LocalFile;
use crate::handler::router::RequestContext;
use crate::http::{self, responder};
use crate::logger;
use crate::output::ViewResponder;

/// Template name of the built-in homepage
pub const HOMEPAGE_TEMPLATE: &str = "homepage.html";

/// Built-in homepage listing the configured routes
pub const HOMEPAGE_SOURCE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{ server_name }}</title>
</head>
<body>
    <h1>{{ server_name }}</h1>
    <p>Files are served with byte-range support (<code>Range: bytes=start-end</code>).</p>
    {% if routes | length > 0 %}
    <ul>
    {% for route in routes %}
        <li><a href="{{ route }}">{{ route }}</a></li>
    {% endfor %}
    </ul>
    {% else %}
    <p>No file routes configured.</p>
    {% endif %}
</body>
</html>
"#;

#[derive(Serialize)]
struct HomepageData<'a> {
    server_name: &'a str,
    routes: Vec<&'a str>,
}

/// Serve a file from under `dir`, addressed by the path after `route_prefix`
pub async fn serve_directory(
    ctx: &RequestContext<'_>,
    dir: &str,
    route_prefix: &str,
    index_files: &[String],
) -> Response<Full<Bytes>> {
    match resolve_in_directory(Path::new(dir), ctx.path, route_prefix, index_files) {
        Some(path) => serve_path(ctx, path).await,
        None => http::build_404_response(),
    }
}

/// Serve a single file
pub async fn serve_file(ctx: &RequestContext<'_>, file_path: &str) -> Response<Full<Bytes>> {
    serve_path(ctx, PathBuf::from(file_path)).await
}

/// Resolve the range request against the file and emit the chosen span
async fn serve_path(ctx: &RequestContext<'_>, path: PathBuf) -> Response<Full<Bytes>> {
    let file = LocalFile::open(path).await;
    let range_header = ctx.range_header.as_deref();

    match responder::respond_with_file(&file, range_header) {
        Ok(descriptor) => {
            if ctx.access_log && range_header.is_some() {
                logger::log_range_decision(range_header, &descriptor);
            }
            http::emit(descriptor, file.path(), ctx.is_head).await
        }
        Err(e) => {
            logger::log_warning(&format!("Rejected range for {}: {e}", ctx.path));
            http::build_400_response(&e.to_string())
        }
    }
}

/// Map a request path to a file inside `static_dir`
///
/// Directories resolve to their first existing index file. Paths that
/// canonicalize outside `static_dir` are refused.
pub fn resolve_in_directory(
    static_dir: &Path,
    path: &str,
    route_prefix: &str,
    index_files: &[String],
) -> Option<PathBuf> {
    let clean_path = path.trim_start_matches('/');

    let prefix_clean = route_prefix.trim_matches('/');
    let relative_path = if prefix_clean.is_empty() {
        clean_path
    } else {
        clean_path
            .strip_prefix(prefix_clean)
            .map_or(clean_path, |rest| rest.trim_start_matches('/'))
    };

    let static_dir_canonical = match static_dir.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            logger::log_warning(&format!(
                "Static directory not found or inaccessible '{}': {e}",
                static_dir.display()
            ));
            return None;
        }
    };

    let mut file_path = static_dir_canonical.join(relative_path);

    if file_path.is_dir() {
        file_path = index_files
            .iter()
            .map(|index| file_path.join(index))
            .find(|candidate| candidate.is_file())?;
    }

    // Missing files are a plain 404
    let file_path_canonical = file_path.canonicalize().ok()?;
    if !file_path_canonical.starts_with(&static_dir_canonical) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {path} -> {}",
            file_path_canonical.display()
        ));
        return None;
    }

    Some(file_path_canonical)
}

/// Render the built-in homepage
pub fn serve_homepage(
    ctx: &RequestContext<'_>,
    views: &ViewResponder,
    server_name: &str,
    routes: Vec<&str>,
) -> Response<Full<Bytes>> {
    let data = HomepageData {
        server_name,
        routes,
    };

    views
        .respond(HOMEPAGE_TEMPLATE, Some(&data), ctx.is_head)
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to render homepage: {e}"));
            http::response::build_text_response(
                hyper::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_files() -> Vec<String> {
        vec!["index.html".to_string()]
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("public/docs")).unwrap();
        std::fs::write(dir.path().join("public/video.mp4"), b"frames").unwrap();
        std::fs::write(dir.path().join("public/docs/index.html"), b"<p>docs</p>").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"nope").unwrap();
        dir
    }

    #[test]
    fn test_resolve_file_under_prefix() {
        let dir = fixture();
        let root = dir.path().join("public");
        let resolved =
            resolve_in_directory(&root, "/media/video.mp4", "/media", &index_files()).unwrap();
        assert_eq!(resolved, root.canonicalize().unwrap().join("video.mp4"));
    }

    #[test]
    fn test_resolve_directory_index() {
        let dir = fixture();
        let root = dir.path().join("public");
        let resolved = resolve_in_directory(&root, "/media/docs/", "/media", &index_files()).unwrap();
        assert!(resolved.ends_with("docs/index.html"));
    }

    #[test]
    fn test_resolve_blocks_traversal() {
        let dir = fixture();
        let root = dir.path().join("public");
        assert!(resolve_in_directory(&root, "/media/../secret.txt", "/media", &index_files()).is_none());
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = fixture();
        let root = dir.path().join("public");
        assert!(resolve_in_directory(&root, "/media/none.bin", "/media", &index_files()).is_none());
        assert!(resolve_in_directory(&dir.path().join("absent"), "/x", "/", &index_files()).is_none());
    }

    #[test]
    fn test_homepage_lists_routes() {
        let views = ViewResponder::from_templates([(HOMEPAGE_TEMPLATE, HOMEPAGE_SOURCE)]).unwrap();
        let html = views
            .render(
                HOMEPAGE_TEMPLATE,
                Some(&HomepageData {
                    server_name: "rangeserve",
                    routes: vec!["/media"],
                }),
            )
            .unwrap();
        assert!(html.contains("<title>rangeserve</title>"));
        // Tera escapes '/' in autoescaped output
        assert!(html.contains(r#"<a href="&#x2F;media">&#x2F;media</a>"#));
    }
}
