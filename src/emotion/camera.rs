//! V4L2 webcam capture for the live stream.
//!
//! The device is opened when a stream starts and held by a dedicated
//! blocking task. Each frame is classified, annotated and JPEG-encoded, then
//! handed over a small channel; when the receiver goes away the task exits
//! and the device is released.

use super::annotate::{annotate, encode_jpeg};
use super::{DetectionError, EmotionPipeline};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;
const CHANNEL_DEPTH: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("capture failed: {0}")]
    Capture(String),
}

struct Camera {
    device: Device,
    width: u32,
    height: u32,
}

impl Camera {
    fn open(path: &Path) -> Result<Self, CameraError> {
        if !path.exists() {
            return Err(CameraError::DeviceNotFound(path.display().to_string()));
        }
        let device = Device::with_path(path)
            .map_err(|e| CameraError::DeviceNotFound(format!("{}: {}", path.display(), e)))?;

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::Format(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = FRAME_WIDTH;
        fmt.height = FRAME_HEIGHT;
        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::Format(format!("failed to set format: {e}")))?;
        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(CameraError::Format(format!(
                "unsupported pixel format {:?}, need YUYV",
                negotiated.fourcc
            )));
        }

        tracing::info!(
            device = %path.display(),
            width = negotiated.width,
            height = negotiated.height,
            "camera opened"
        );
        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
        })
    }

    /// Capture until the receiver is dropped or the device fails
    fn run(&self, pipeline: &EmotionPipeline, tx: &mpsc::Sender<Vec<u8>>) -> Result<(), CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CameraError::Capture(format!("failed to create mmap stream: {e}")))?;

        loop {
            let (buf, _meta) = stream
                .next()
                .map_err(|e| CameraError::Capture(format!("failed to dequeue buffer: {e}")))?;
            let (mut rgb, gray) = yuyv_to_images(buf, self.width, self.height)?;

            match pipeline.analyze(&gray) {
                Ok(outcome) => annotate(&mut rgb, &outcome),
                Err(DetectionError::NoFacesDetected) => {}
                Err(e) => tracing::debug!(error = %e, "frame not annotated"),
            }

            let jpeg = encode_jpeg(&rgb).map_err(|e| CameraError::Capture(e.to_string()))?;
            if tx.blocking_send(jpeg).is_err() {
                return Ok(());
            }
        }
    }
}

/// Open `device` and start streaming annotated JPEG frames.
///
/// Returns once the device is open, so open failures reach the caller.
pub async fn start(
    device: PathBuf,
    pipeline: Arc<EmotionPipeline>,
) -> Result<mpsc::Receiver<Vec<u8>>, CameraError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let camera = match Camera::open(&device) {
            Ok(camera) => {
                let _ = ready_tx.send(Ok(()));
                camera
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        match camera.run(&pipeline, &tx) {
            Ok(()) => tracing::info!(device = %device.display(), "camera stream closed"),
            Err(e) => tracing::warn!(device = %device.display(), error = %e, "camera stream failed"),
        }
    });

    ready_rx
        .await
        .map_err(|_| CameraError::Capture("capture task ended early".to_string()))??;
    Ok(rx)
}

/// Packed YUYV 4:2:2 to an RGB frame plus its luma plane (BT.601)
fn yuyv_to_images(buf: &[u8], width: u32, height: u32) -> Result<(RgbImage, GrayImage), CameraError> {
    let pixels = (width * height) as usize;
    if buf.len() < pixels * 2 {
        return Err(CameraError::Capture(format!(
            "YUYV buffer too short: expected {}, got {}",
            pixels * 2,
            buf.len()
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut luma = Vec::with_capacity(pixels);
    for chunk in buf[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            rgb.extend_from_slice(&yuv_to_rgb(y, u, v));
            luma.push(y);
        }
    }

    let rgb = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CameraError::Capture("bad RGB frame size".to_string()))?;
    let gray = GrayImage::from_raw(width, height, luma)
        .ok_or_else(|| CameraError::Capture("bad luma frame size".to_string()))?;
    Ok((rgb, gray))
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_conversion() {
        // Two pixels: black then white, neutral chroma
        let buf = [16u8, 128, 235, 128];
        let (rgb, gray) = yuyv_to_images(&buf, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(gray.as_raw(), &vec![16, 235]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(yuyv_to_images(&[0u8; 3], 2, 1).is_err());
    }

    #[tokio::test]
    async fn test_missing_device() {
        let pipeline = Arc::new(crate::emotion::testing::stub_pipeline(vec![], vec![[0.0; 7]]));
        let result = start(PathBuf::from("/dev/nonexistent-video"), pipeline).await;
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }
}
