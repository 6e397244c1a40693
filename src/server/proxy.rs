//! The interception boundary.
//!
//! Every request that is not a built-in route lands here. Video requests for
//! live objects get a synthesized stream; everything else is forwarded to
//! the origin unchanged apart from the live-read capability header.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use super::error::AppError;
use super::AppContext;
use crate::streaming::LiveSession;
use crate::{Error, Result};

/// Largest request body forwarded to the origin.
const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Fallback handler: stream live video, forward everything else.
pub async fn intercept(State(ctx): State<AppContext>, request: Request) -> Response {
    let url = match origin_url(ctx.config.origin.base_url.as_deref(), request.uri()) {
        Ok(url) => url,
        Err(e) => return AppError::from(e).into_response(),
    };

    let is_video = request.method() == Method::GET
        && is_video_request(
            request.headers(),
            request.uri().path(),
            &ctx.config.intercept.extensions,
        );

    if is_video {
        match ctx.streamer.open(&url).await {
            Ok(Some(session)) => return live_response(session),
            Ok(None) => {}
            Err(e) => return AppError::from(e).into_response(),
        }
    }

    match forward(&ctx, request, &url).await {
        Ok(response) => response,
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Whether a request is for something a player will render as video.
pub fn is_video_request(headers: &HeaderMap, path: &str, extensions: &[String]) -> bool {
    let dest_is_video = headers
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("video"));
    if dest_is_video {
        return true;
    }

    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((_, ext)) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Map a request URI onto the origin.
pub fn origin_url(base_url: Option<&str>, uri: &Uri) -> Result<String> {
    let base = base_url
        .ok_or_else(|| Error::Proxy("origin.base_url is not configured".to_string()))?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(format!("{}{}", base.trim_end_matches('/'), path))
}

fn live_response(session: LiveSession) -> Response {
    // No content length: hyper sends the body with chunked transfer encoding.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(session.into_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn forward(ctx: &AppContext, request: Request, url: &str) -> Result<Response> {
    let (parts, body) = request.into_parts();

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| Error::BadRequest(format!("unsupported method {}", parts.method)))?;

    let mut upstream = ctx.origin.http().request(method, url);
    for (name, value) in parts.headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        upstream = upstream.header(name.as_str(), value.as_bytes());
    }
    upstream = upstream.header(ctx.origin.capability_header(), "true");

    let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| Error::BadRequest(format!("unreadable request body: {}", e)))?;
    if !body.is_empty() {
        upstream = upstream.body(body);
    }

    let upstream = upstream.send().await?;
    tracing::debug!(url, status = %upstream.status(), "Forwarded request");

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::builder().status(status);
    for (name, value) in upstream.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        response = response.header(name.as_str(), value.as_bytes());
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| Error::Proxy(format!("unforwardable origin response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn extensions() -> Vec<String> {
        vec!["mp4".to_string(), "m4v".to_string()]
    }

    #[test]
    fn video_by_extension() {
        let headers = HeaderMap::new();
        assert!(is_video_request(&headers, "/cam/live.mp4", &extensions()));
        assert!(is_video_request(&headers, "/cam/LIVE.M4V", &extensions()));
        assert!(!is_video_request(&headers, "/cam/index.html", &extensions()));
        assert!(!is_video_request(&headers, "/cam/mp4", &extensions()));
        assert!(!is_video_request(&headers, "/cam.mp4/readme", &extensions()));
    }

    #[test]
    fn video_by_fetch_destination() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-dest", HeaderValue::from_static("video"));
        assert!(is_video_request(&headers, "/stream", &[]));

        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        assert!(!is_video_request(&headers, "/stream", &[]));
    }

    #[test]
    fn origin_url_joins_path_and_query() {
        let uri: Uri = "/cam/live.mp4?x=1".parse().unwrap();
        assert_eq!(
            origin_url(Some("http://origin:9000/bucket/"), &uri).unwrap(),
            "http://origin:9000/bucket/cam/live.mp4?x=1"
        );
    }

    #[test]
    fn origin_url_requires_base() {
        let uri: Uri = "/live.mp4".parse().unwrap();
        assert!(matches!(origin_url(None, &uri), Err(Error::Proxy(_))));
    }
}
