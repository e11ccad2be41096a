//! Response rendering: structured JSON vs server-rendered views
//!
//! Every operation outcome passes through one negotiation step and one
//! renderer, so JSON clients and browser clients observe the same semantics.
//! The `render` query parameter overrides the Accept header; absent both,
//! responses default to JSON.
//!
//! View rendering is pluggable through [`ViewRenderer`]; the default is a
//! [`TeraRenderer`] over a template directory. Templates are looked up as
//! `{resource}/{kind}.html` and receive the root template hint (`page`,
//! `modal` or `fragment`) in their context.

use std::sync::Arc;

use axum::Json;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde_json::json;

use crate::core::error::{EngineError, EngineResult};
use crate::core::resource::Resource;
use crate::server::endpoint::{ListOutcome, MutationOutcome};

/// The two response representations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// JSON bodies
    Structured,
    /// Server-rendered templates
    View,
}

/// Decide the representation: explicit `render` parameter first, then the
/// Accept header, then JSON.
pub fn negotiate(headers: &HeaderMap, render_override: Option<&str>) -> RenderMode {
    match render_override {
        Some("json") => return RenderMode::Structured,
        Some("view") | Some("html") => return RenderMode::View,
        _ => {}
    }
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    if accepts_html {
        RenderMode::View
    } else {
        RenderMode::Structured
    }
}

/// Renders templates for view-mode responses
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, context: &tera::Context) -> EngineResult<String>;
}

/// Tera-backed view renderer
pub struct TeraRenderer {
    tera: tera::Tera,
}

impl TeraRenderer {
    /// Load templates from a glob, e.g. `templates/**/*.html`
    pub fn from_glob(glob: &str) -> EngineResult<Self> {
        let tera = tera::Tera::new(glob).map_err(|e| EngineError::Config {
            message: format!("template load failed: {}", e),
        })?;
        Ok(Self { tera })
    }

    /// Build from in-memory templates, mainly for tests
    pub fn from_templates(templates: Vec<(&str, &str)>) -> EngineResult<Self> {
        let mut tera = tera::Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| EngineError::Config {
                message: format!("template parse failed: {}", e),
            })?;
        Ok(Self { tera })
    }
}

impl ViewRenderer for TeraRenderer {
    fn render(&self, template: &str, context: &tera::Context) -> EngineResult<String> {
        self.tera
            .render(template, context)
            .map_err(|e| EngineError::Render {
                message: format!("template '{}': {}", template, e),
            })
    }
}

/// Assembles final HTTP responses for both representations
#[derive(Clone)]
pub struct ResponseRenderer {
    views: Option<Arc<dyn ViewRenderer>>,
    login_path: String,
}

impl ResponseRenderer {
    pub fn new() -> Self {
        Self {
            views: None,
            login_path: "/login".to_string(),
        }
    }

    pub fn with_views(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.views = Some(renderer);
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Render a list outcome
    pub fn list(
        &self,
        mode: RenderMode,
        resource_type: &str,
        outcome: &ListOutcome,
    ) -> Response {
        match mode {
            RenderMode::Structured => Json(json!({
                "items": outcome.items,
                "page": outcome.meta.page,
                "total": outcome.meta.total,
                "total_pages": outcome.meta.total_pages,
                "has_next": outcome.meta.has_next,
            }))
            .into_response(),
            RenderMode::View => {
                let mut context = tera::Context::new();
                context.insert("items", &outcome.items);
                context.insert("meta", &outcome.meta);
                context.insert("root", &root_hint(outcome.descriptor.out.as_deref()));
                self.html(&format!("{}/list.html", resource_type), &context, StatusCode::OK)
            }
        }
    }

    /// Render a single resource
    pub fn item(
        &self,
        mode: RenderMode,
        resource_type: &str,
        resource: &Resource,
        out: Option<&str>,
    ) -> Response {
        match mode {
            RenderMode::Structured => Json(resource).into_response(),
            RenderMode::View => {
                let mut context = tera::Context::new();
                context.insert("resource", resource);
                context.insert("root", &root_hint(out));
                self.html(&format!("{}/item.html", resource_type), &context, StatusCode::OK)
            }
        }
    }

    /// Render a successful mutation: JSON body, or redirect-after-post
    pub fn mutation(
        &self,
        mode: RenderMode,
        outcome: &MutationOutcome,
        status: StatusCode,
        next: Option<&str>,
    ) -> Response {
        match mode {
            RenderMode::Structured => (
                status,
                Json(json!({
                    "resource": outcome.resource,
                    "notice": outcome.notice,
                    "location": outcome.location,
                })),
            )
                .into_response(),
            RenderMode::View => {
                let target = next.unwrap_or(&outcome.location);
                Redirect::to(target).into_response()
            }
        }
    }

    /// Render an error in the negotiated representation.
    ///
    /// In view mode, an unauthenticated GET redirects to the login page with
    /// the original path as `next`, and a validation failure re-renders the
    /// form carrying the submitted values and field errors with a 400.
    pub fn error(
        &self,
        mode: RenderMode,
        method: &Method,
        path: &str,
        resource_type: &str,
        err: EngineError,
    ) -> Response {
        if mode == RenderMode::Structured {
            return err.into_response();
        }

        match &err {
            EngineError::AuthenticationRequired { .. } if method == Method::GET => {
                Redirect::to(&format!("{}?next={}", self.login_path, path)).into_response()
            }
            EngineError::ValidationFailed { errors, values } => {
                let mut context = tera::Context::new();
                context.insert("errors", errors);
                context.insert("values", values);
                context.insert("root", "page");
                self.html(
                    &format!("{}/form.html", resource_type),
                    &context,
                    StatusCode::BAD_REQUEST,
                )
            }
            _ => {
                let status = err.status_code();
                let mut context = tera::Context::new();
                context.insert("status", &status.as_u16());
                context.insert("message", &err.to_string());
                context.insert("root", "page");
                self.html("error.html", &context, status)
            }
        }
    }

    /// Render an arbitrary template with a 200 status. Used for form pages
    /// that sit outside the list/item/mutation shapes.
    pub fn render_raw(
        &self,
        template: &str,
        context: &tera::Context,
    ) -> EngineResult<Response> {
        let views = self.views.as_ref().ok_or_else(|| EngineError::Render {
            message: "no view renderer configured".to_string(),
        })?;
        let body = views.render(template, context)?;
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response())
    }

    fn html(&self, template: &str, context: &tera::Context, status: StatusCode) -> Response {
        let Some(views) = &self.views else {
            return EngineError::Render {
                message: "no view renderer configured".to_string(),
            }
            .into_response();
        };
        match views.render(template, context) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(err) => err.into_response(),
        }
    }
}

impl Default for ResponseRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// The root template hint: page, modal or fragment. Unknown hints fall back
/// to page.
fn root_hint(out: Option<&str>) -> &'static str {
    match out {
        Some("modal") => "modal",
        Some("fragment") => "fragment",
        _ => "page",
    }
}
