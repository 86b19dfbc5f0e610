use crate::{handlers::pages, store::MappingStore};
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use std::sync::Arc;

/// GET /:code
///
/// Known codes answer 301 with `Location` set to the stored URL and an empty
/// body. Unknown codes get the 404 page, including segments that do not
/// decode to UTF-8.
pub async fn redirect(
    State(store): State<Arc<MappingStore>>,
    uri: Uri,
    code: Result<Path<String>, PathRejection>,
) -> Response {
    let code = match code {
        Ok(Path(code)) => code,
        Err(rejection) => {
            let raw = uri.path().trim_start_matches('/');
            tracing::debug!("Undecodable short code '{}': {}", raw, rejection);
            return pages::not_found(&percent_decode_str(raw).decode_utf8_lossy());
        }
    };

    let Some(original_url) = store.get_by_code(&code) else {
        tracing::debug!("No mapping for short code '{}'", code);
        return pages::not_found(&code);
    };

    match HeaderValue::try_from(original_url) {
        Ok(location) => {
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        Err(e) => {
            tracing::error!(
                "Stored URL for '{}' is not a valid header value: {:?}",
                code,
                e
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
