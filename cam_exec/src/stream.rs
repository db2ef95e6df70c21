//! # MJPEG stream server
//!
//! HTTP routes serving the camera as a `multipart/x-mixed-replace` stream. Every part holds one
//! JPEG frame with its length. The root path redirects to the stream and anything else is a 404.
//!
//! A stream ends when the frame producer goes away, which lets the server shut down gracefully.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream;
use log::{debug, info};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::relay::FrameSubscriber;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Multipart boundary between frames.
pub const BOUNDARY: &str = "FRAME";

const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=FRAME";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Clone)]
struct StreamState {
    frames: Arc<FrameSubscriber>,
    stream_path: Arc<str>,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the routes, streaming frames from the relay `frames` subscribes to.
pub fn router(frames: FrameSubscriber, stream_path: &str) -> Router {
    let stream_path = if stream_path.starts_with('/') {
        stream_path.to_string()
    } else {
        format!("/{}", stream_path)
    };

    let state = StreamState {
        frames: Arc::new(frames),
        stream_path: stream_path.as_str().into(),
    };

    Router::new()
        .route("/", get(redirect))
        .route(&stream_path, get(mjpeg_stream))
        .fallback(not_found)
        .with_state(state)
}

/// Serve the routes until `shutdown` completes and every open stream has ended.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Stream server listening on {:?}", listener.local_addr().ok());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// One multipart part holding `frame`.
pub fn mjpeg_part(frame: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        frame.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(frame);
    part.put_slice(b"\r\n");

    part.freeze()
}

async fn redirect(State(state): State<StreamState>) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, state.stream_path.to_string())],
    )
        .into_response()
}

async fn mjpeg_stream(State(state): State<StreamState>) -> Response {
    debug!("New stream client");

    let parts = stream::unfold(state.frames.fresh(), |mut sub| async move {
        let frame = sub.next_frame().await?;
        Some((Ok::<_, Infallible>(mjpeg_part(&frame)), sub))
    });

    (
        [
            (header::AGE, "0"),
            (header::CACHE_CONTROL, "no-cache, private"),
            (header::PRAGMA, "no-cache"),
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::relay::FrameRelay;
    use axum::http::Request;
    use futures_util::StreamExt;
    use tower::ServiceExt;

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_part_format() {
        assert_eq!(
            &mjpeg_part(b"abc")[..],
            &b"--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\nabc\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_redirect_and_not_found() {
        let relay = FrameRelay::new();
        let app = router(relay.subscribe(), "stream.mjpg");

        let resp = app.clone().oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers()[header::LOCATION], "/stream.mjpg");

        let resp = app.oneshot(get_req("/index.html")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stream() {
        let relay = FrameRelay::new();
        let app = router(relay.subscribe(), "/stream.mjpg");

        let resp = app.clone().oneshot(get_req("/stream.mjpg")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], STREAM_CONTENT_TYPE);
        assert_eq!(resp.headers()[header::AGE], "0");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache, private");
        assert_eq!(resp.headers()[header::PRAGMA], "no-cache");

        let other = app.oneshot(get_req("/stream.mjpg")).await.unwrap();

        let mut a = resp.into_body().into_data_stream();
        let mut b = other.into_body().into_data_stream();

        relay.publish(Bytes::from_static(b"\xFF\xD8one\xFF\xD9"));
        assert_eq!(a.next().await.unwrap().unwrap(), mjpeg_part(b"\xFF\xD8one\xFF\xD9"));
        assert_eq!(b.next().await.unwrap().unwrap(), mjpeg_part(b"\xFF\xD8one\xFF\xD9"));

        relay.publish(Bytes::from_static(b"two"));
        assert_eq!(a.next().await.unwrap().unwrap(), mjpeg_part(b"two"));

        // Streams end with the producer
        drop(relay);
        assert!(a.next().await.is_none());
    }
}
