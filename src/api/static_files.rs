//! Embedded static asset serving (`/static/*`)

use axum::{
    body::Body,
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::pages::StaticAssets;

/// GET /static/{*path}
pub async fn serve_static(Path(path): Path<String>) -> Response {
    // URL decode the path to handle encoded characters
    let decoded = urlencoding::decode(&path)
        .map(|p| p.into_owned())
        .unwrap_or(path);
    let asset_path = decoded.trim_start_matches('/');

    if asset_path.split('/').any(|part| part == "..") {
        return not_found();
    }

    match StaticAssets::get(asset_path) {
        Some(content) => build_response(asset_path, content.data.into_owned()),
        None => not_found(),
    }
}

/// Build HTTP response with proper headers
fn build_response(path: &str, data: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, get_content_type(path)),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        Body::from(data),
    )
        .into_response()
}

/// 404 response
fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found",
    )
        .into_response()
}

/// Get content type from file extension
fn get_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(get_content_type("css/style.css"), "text/css");
        assert_eq!(get_content_type("js/app.js"), "application/javascript");
        assert_eq!(get_content_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serves_embedded_asset() {
        let response = serve_static(Path("js/app.js".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/javascript"
        );
    }

    #[tokio::test]
    async fn test_missing_and_traversal() {
        let response = serve_static(Path("js/missing.js".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = serve_static(Path("../Cargo.toml".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
