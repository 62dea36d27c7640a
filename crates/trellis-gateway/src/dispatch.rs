//! The dynamic entry point: `/r/{slug}` and `/r/{slug}/{*path}`.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use trellis_core::script_abi::{KeyValuePair, RouteRequest, RouteResponse};

use crate::app::AppState;
use crate::error::ApiError;

pub(crate) async fn dispatch_root(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(state, slug, "/".to_owned(), method, query, headers, body).await
}

pub(crate) async fn dispatch_path(
    State(state): State<AppState>,
    Path((slug, path)): Path<(String, String)>,
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run(state, slug, format!("/{path}"), method, query, headers, body).await
}

async fn run(
    state: AppState,
    slug: String,
    path: String,
    method: Method,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RouteRequest {
        method: method.as_str().to_owned(),
        path,
        params: Vec::new(),
        query: query
            .into_iter()
            .map(|(key, value)| KeyValuePair::new(key, value))
            .collect(),
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| KeyValuePair::new(name.as_str(), v))
            })
            .collect(),
        body: encode_body(&body),
    };

    match state.manager.dispatch(&slug, request).await {
        Ok(response) => render(response),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Scripts see text bodies verbatim; binary bodies arrive base64-encoded.
fn encode_body(bytes: &Bytes) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => STANDARD.encode(bytes),
    }
}

/// Pass the script's explicit response through unchanged.
fn render(response: RouteResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, response.body).into_response();
    for pair in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(pair.key.as_str()),
            HeaderValue::try_from(pair.value.as_str()),
        ) {
            out.headers_mut().insert(name, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_bodies_pass_through_binary_bodies_encode() {
        assert_eq!(encode_body(&Bytes::from_static(b"hello")), "hello");
        let encoded = encode_body(&Bytes::from_static(&[0xff, 0xfe, 0x00]));
        assert_eq!(STANDARD.decode(&encoded).unwrap(), vec![0xff, 0xfe, 0x00]);
    }

    #[test]
    fn render_keeps_status_and_headers() {
        let out = render(RouteResponse {
            status: 201,
            headers: vec![KeyValuePair::new("content-type", "application/json")],
            body: "{}".into(),
        });
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(
            out.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn out_of_range_status_collapses_to_500() {
        let out = render(RouteResponse {
            status: 42,
            headers: Vec::new(),
            body: String::new(),
        });
        assert_eq!(out.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
