//! Shared fixtures for unit tests: synthetic frames, stub transforms and
//! in-process relay servers.

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use frame_dream_common::frame::{encode_base64, Frame, TransportPayload};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{RemoteTransform, TransformError};

pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    RgbImage::from_pixel(width, height, Rgb(rgb))
}

pub fn jpeg_bytes(frame: &Frame) -> Vec<u8> {
    TransportPayload::encode_jpeg(frame, 95).unwrap().bytes
}

pub fn png_bytes(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(frame.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// Serve `app` on an ephemeral localhost port and return its base URL (with trailing slash).
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}/")
}

/// A URL nothing is listening on.
pub async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

/// Relay that answers every upload with a fixed status and raw body.
pub fn relay_returning(status: StatusCode, body: String) -> Router {
    Router::new().route(
        "/",
        post(move || {
            let body = body.clone();
            async move { (status, body) }
        }),
    )
}

/// Relay that answers with `image` as a base64 PNG.
pub fn relay_with_image(image: &Frame, data_url: bool) -> Router {
    let mut encoded = encode_base64(&png_bytes(image));
    if data_url {
        encoded = format!("data:image/png;base64,{encoded}");
    }
    relay_returning(
        StatusCode::OK,
        json!({"status": "success", "image": encoded}).to_string(),
    )
}

/// Relay that checks the multipart contract and sends the upload straight back.
pub fn echo_relay() -> Router {
    Router::new().route("/", post(echo))
}

async fn echo(mut multipart: Multipart) -> (StatusCode, Json<Value>) {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("image") {
            continue;
        }
        if field.file_name() != Some("frame.jpg") || field.content_type() != Some("image/jpeg") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "message": "bad upload metadata"})),
            );
        }
        let bytes = field.bytes().await.unwrap_or_default();
        let image = format!("data:image/jpeg;base64,{}", encode_base64(&bytes));
        return (
            StatusCode::OK,
            Json(json!({"status": "success", "image": image})),
        );
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"status": "error", "message": "no image field"})),
    )
}

/// In-memory transform with scripted outcomes.
#[derive(Default)]
pub struct StubTransform {
    calls: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<Frame, TransformError>>>,
    delay: Option<Duration>,
}

impl StubTransform {
    pub fn new(outcomes: Vec<Result<Frame, TransformError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        })
    }

    pub fn delayed(delay: Duration, outcomes: Vec<Result<Frame, TransformError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            delay: Some(delay),
            ..Default::default()
        })
    }

    /// Always succeeds with `image`.
    pub fn always(image: Frame) -> Arc<Self> {
        Self::new((0..64).map(|_| Ok(image.clone())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteTransform for StubTransform {
    async fn submit(&self, _frame: &Frame) -> Result<Frame, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or(Err(TransformError::MissingImage))
    }
}

/// Captures formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Install a thread-local subscriber writing into this buffer.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
