//! Embedded admin UI bundle (spec §6 `GET /`, spec §9 "Embedded static
//! assets: treat as an opaque byte bundle behind a read-only interface").
//! Grounded on `ops_catalog::render::Assets`'s `RustEmbed` usage, folded
//! into a plain byte-serving handler instead of a template renderer since
//! this workspace has no handlebars templating to do.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

/// Serves `index.html` for `GET /`. The admin UI is a static single-page
/// bundle; any client-side routing happens entirely within it.
pub async fn index() -> Response {
    serve_embedded("index.html").await
}

async fn serve_embedded(path: &str) -> Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], file.data).into_response()
        }
        None => (StatusCode::NOT_FOUND, "admin UI asset not found").into_response(),
    }
}
