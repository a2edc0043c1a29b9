//! Template view responder
//!
//! Renders Tera templates into HTML responses.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::http::build_html_response;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Failed to load templates: {0}")]
    Load(#[source] tera::Error),
    #[error("Failed to render template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },
}

/// Tera-backed view
pub struct ViewResponder {
    tera: Tera,
}

impl ViewResponder {
    pub const fn new(tera: Tera) -> Self {
        Self { tera }
    }

    /// Load every template matching a glob, e.g. `templates/**/*.html`
    pub fn from_glob(pattern: &str) -> Result<Self, ViewError> {
        Tera::new(pattern).map(Self::new).map_err(ViewError::Load)
    }

    /// Build from in-memory `(name, source)` pairs
    pub fn from_templates<'a>(
        templates: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ViewError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates).map_err(ViewError::Load)?;
        Ok(Self::new(tera))
    }

    /// Add or replace one template
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), ViewError> {
        self.tera
            .add_raw_template(name, source)
            .map_err(ViewError::Load)
    }

    /// Render `template`, with `data` as the context when given
    pub fn render<T: Serialize>(&self, template: &str, data: Option<&T>) -> Result<String, ViewError> {
        let context = match data {
            Some(data) => Context::from_serialize(data).map_err(|source| ViewError::Render {
                template: template.to_string(),
                source,
            })?,
            None => Context::new(),
        };

        self.tera
            .render(template, &context)
            .map_err(|source| ViewError::Render {
                template: template.to_string(),
                source,
            })
    }

    /// Render `template` into a 200 HTML response
    pub fn respond<T: Serialize>(
        &self,
        template: &str,
        data: Option<&T>,
        is_head: bool,
    ) -> Result<Response<Full<Bytes>>, ViewError> {
        let html = self.render(template, data)?;
        Ok(build_html_response(html, is_head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::StatusCode;
    use serde_json::json;

    fn view() -> ViewResponder {
        ViewResponder::from_templates([
            ("hello.html", "<h1>Hello {{ name }}</h1>"),
            ("static.html", "<p>static</p>"),
        ])
        .unwrap()
    }

    #[test]
    fn test_render_with_data() {
        let html = view()
            .render("hello.html", Some(&json!({"name": "range"})))
            .unwrap();
        assert_eq!(html, "<h1>Hello range</h1>");
    }

    #[test]
    fn test_render_without_data() {
        let html = view().render::<()>("static.html", None).unwrap();
        assert_eq!(html, "<p>static</p>");
    }

    #[test]
    fn test_render_escapes_html() {
        let html = view()
            .render("hello.html", Some(&json!({"name": "<b>"})))
            .unwrap();
        assert_eq!(html, "<h1>Hello &lt;b&gt;</h1>");
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let err = view().render::<()>("nope.html", None).unwrap_err();
        assert!(matches!(err, ViewError::Render { ref template, .. } if template == "nope.html"));
    }

    #[test]
    fn test_respond_builds_html_response() {
        let resp = view()
            .respond("hello.html", Some(&json!({"name": "x"})), false)
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
    }
}
