use askama::Template;
use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "landing.html")]
pub struct LandingTemplate;

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    /// Rendered through askama's HTML escaper.
    pub code: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /
/// Static landing page, no dynamic content.
pub async fn landing() -> LandingTemplate {
    LandingTemplate
}

/// Any path that is not `/` or a single `/:code` segment.
pub async fn fallback(uri: Uri) -> Response {
    not_found(uri.path().trim_start_matches('/'))
}

/// 404 page naming the code that could not be resolved.
pub fn not_found(code: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            code: code.to_owned(),
        },
    )
        .into_response()
}
