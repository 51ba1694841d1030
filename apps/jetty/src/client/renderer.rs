//! Canvas renderer glue: consumes `frame` events, decodes payloads,
//! and paints them onto a backing surface sized to the remote
//! viewport. Concrete display technology sits behind [`RenderSurface`];
//! decode sits behind [`FrameDecoder`] (decode quality is out of scope
//! for this client, so the default decoder only validates the payload).

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use sync_bus::SubscriptionId;
use tracing::{trace, warn};

use super::connection::{ConnectionManager, SyncEvent, topics};
use crate::geometry::{DisplayFit, Viewport, fit_to_container};
use crate::protocol::Frame;

/// An image ready to paint, at the frame's declared dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not a JPEG image")]
    NotJpeg,
}

pub trait FrameDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Result<DecodedImage, DecodeError>;
}

/// Default decoder: validates the JPEG start-of-image marker and hands
/// the bytes through untouched for the surface to rasterize.
pub struct JpegPassthrough;

impl FrameDecoder for JpegPassthrough {
    fn decode(&self, frame: &Frame) -> Result<DecodedImage, DecodeError> {
        if frame.payload.len() < 2 || frame.payload[0] != 0xFF || frame.payload[1] != 0xD8 {
            return Err(DecodeError::NotJpeg);
        }
        Ok(DecodedImage {
            width: frame.width,
            height: frame.height,
            bytes: frame.payload.clone(),
        })
    }
}

/// The displayable backing surface. `resize` is called before `present`
/// whenever the viewport changes.
pub trait RenderSurface: Send {
    fn resize(&mut self, viewport: Viewport);
    fn present(&mut self, image: &DecodedImage);
}

#[derive(Debug, Default)]
struct FramebufferState {
    size: Option<Viewport>,
    last_image: Option<DecodedImage>,
    presented: u64,
    resizes: u64,
}

/// In-memory surface used by the demo binary and tests. Clones share
/// the same buffer so callers can inspect what was painted.
#[derive(Clone, Default)]
pub struct SharedFramebuffer {
    state: Arc<Mutex<FramebufferState>>,
}

impl SharedFramebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Option<Viewport> {
        self.state.lock().size
    }

    pub fn last_image(&self) -> Option<DecodedImage> {
        self.state.lock().last_image.clone()
    }

    pub fn presented(&self) -> u64 {
        self.state.lock().presented
    }

    pub fn resizes(&self) -> u64 {
        self.state.lock().resizes
    }
}

impl RenderSurface for SharedFramebuffer {
    fn resize(&mut self, viewport: Viewport) {
        let mut state = self.state.lock();
        state.size = Some(viewport);
        state.resizes += 1;
    }

    fn present(&mut self, image: &DecodedImage) {
        let mut state = self.state.lock();
        state.last_image = Some(image.clone());
        state.presented += 1;
    }
}

struct RendererInner {
    surface: Mutex<Box<dyn RenderSurface>>,
    decoder: Box<dyn FrameDecoder>,
    surface_viewport: Mutex<Option<Viewport>>,
}

impl RendererInner {
    fn render(&self, frame: &Frame) {
        let image = match self.decoder.decode(frame) {
            Ok(image) => image,
            Err(err) => {
                // Keep the previous frame on screen rather than
                // flickering to blank.
                warn!(error = %err, "frame decode failed; keeping last frame");
                return;
            }
        };
        let viewport = Viewport {
            width: frame.width,
            height: frame.height,
        };
        let mut surface = self.surface.lock();
        {
            let mut current = self.surface_viewport.lock();
            if *current != Some(viewport) {
                surface.resize(viewport);
                *current = Some(viewport);
            }
        }
        surface.present(&image);
        trace!(width = image.width, height = image.height, "frame presented");
    }
}

/// Subscribes to `frame` events for as long as it lives; dropping it
/// detaches from the bus.
pub struct CanvasRenderer {
    manager: ConnectionManager,
    subscription: SubscriptionId,
}

impl CanvasRenderer {
    pub fn attach(
        manager: &ConnectionManager,
        surface: Box<dyn RenderSurface>,
        decoder: Box<dyn FrameDecoder>,
    ) -> Self {
        let inner = Arc::new(RendererInner {
            surface: Mutex::new(surface),
            decoder,
            surface_viewport: Mutex::new(None),
        });
        let subscription = manager.on(topics::FRAME, move |event| {
            if let SyncEvent::Frame(frame) = event {
                inner.render(frame);
            }
        });
        Self {
            manager: manager.clone(),
            subscription,
        }
    }

    /// Display size for the current viewport inside a container,
    /// preserving aspect ratio. Recompute on window resize, container
    /// resize, and viewport change. `None` means skip this layout pass.
    pub fn layout(
        &self,
        container_width: f64,
        container_height: f64,
        used_height: f64,
    ) -> Option<DisplayFit> {
        let viewport = self.manager.viewport()?;
        fit_to_container(
            container_width,
            container_height,
            used_height,
            viewport.aspect_ratio(),
        )
    }
}

impl Drop for CanvasRenderer {
    fn drop(&mut self) {
        self.manager.off(topics::FRAME, self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Target};
    use crate::transport::mock::MockDialer;
    use std::time::Duration;

    fn jpeg_frame(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&width.to_be_bytes());
        buf.extend_from_slice(&height.to_be_bytes());
        buf.push(0xFF);
        buf.push(0xD8);
        buf.extend_from_slice(&[0x11; 126]);
        buf
    }

    fn junk_frame(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&width.to_be_bytes());
        buf.extend_from_slice(&height.to_be_bytes());
        buf.extend_from_slice(&[0x00; 128]);
        buf
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn presents_frames_and_resizes_on_viewport_change() {
        let (dialer, mut connections) = MockDialer::new();
        let manager = ConnectionManager::new(Config::default(), Arc::new(dialer));
        let framebuffer = SharedFramebuffer::new();
        let _renderer = CanvasRenderer::attach(
            &manager,
            Box::new(framebuffer.clone()),
            Box::new(JpegPassthrough),
        );

        manager.connect(Target::Video);
        let conn = connections.recv().await.expect("dialed");
        settle().await;

        conn.send_binary(jpeg_frame(1280, 720));
        conn.send_binary(jpeg_frame(1280, 720));
        conn.send_binary(jpeg_frame(1920, 1080));
        settle().await;

        assert_eq!(framebuffer.presented(), 3);
        // One resize for the initial size, one for the change.
        assert_eq!(framebuffer.resizes(), 2);
        assert_eq!(framebuffer.size(), Some(Viewport { width: 1920, height: 1080 }));
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_keeps_previous_frame() {
        let (dialer, mut connections) = MockDialer::new();
        let manager = ConnectionManager::new(Config::default(), Arc::new(dialer));
        let framebuffer = SharedFramebuffer::new();
        let _renderer = CanvasRenderer::attach(
            &manager,
            Box::new(framebuffer.clone()),
            Box::new(JpegPassthrough),
        );

        manager.connect(Target::Video);
        let conn = connections.recv().await.expect("dialed");
        settle().await;

        conn.send_binary(jpeg_frame(640, 480));
        conn.send_binary(junk_frame(640, 480));
        settle().await;

        assert_eq!(framebuffer.presented(), 1);
        let image = framebuffer.last_image().expect("previous frame retained");
        assert_eq!(image.bytes[0], 0xFF);
    }

    #[tokio::test(start_paused = true)]
    async fn layout_follows_the_viewport() {
        let (dialer, mut connections) = MockDialer::new();
        let manager = ConnectionManager::new(Config::default(), Arc::new(dialer));
        let framebuffer = SharedFramebuffer::new();
        let renderer = CanvasRenderer::attach(
            &manager,
            Box::new(framebuffer.clone()),
            Box::new(JpegPassthrough),
        );

        // No viewport yet: skip layout.
        assert_eq!(renderer.layout(800.0, 600.0, 0.0), None);

        manager.connect(Target::Video);
        let conn = connections.recv().await.expect("dialed");
        settle().await;
        conn.send_binary(jpeg_frame(1600, 900));
        settle().await;

        let fit = renderer.layout(800.0, 600.0, 0.0).expect("fits");
        assert_eq!((fit.width, fit.height), (800, 450));
    }
}
