//! # Frame sources
//!
//! Blocking producers of JPEG frames, run on their own thread and published into the
//! [`FrameRelay`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, ColorType, Rgb, RgbImage};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::params::CamExecParams;
use crate::relay::FrameRelay;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pause after a failed capture before trying again.
const RETRY_PERIOD: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait FrameSource {
    /// Block until the next JPEG frame is available.
    fn next_frame(&mut self) -> Result<Bytes, StreamError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Moving colour bars, paced at the frame rate.
pub struct TestPattern {
    width: u32,
    height: u32,
    quality: u8,
    period: Duration,
    next_at: Instant,
    frame_num: u32,
}

/// Frames captured from a V4L2 camera in MJPEG mode.
#[cfg(feature = "hw")]
pub struct V4l2Source {
    camera: rscam::Camera,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Could not open the camera: {0}")]
    Open(String),

    #[error("Could not capture a frame: {0}")]
    Capture(String),

    #[error("Could not encode a frame: {0}")]
    Encode(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TestPattern {
    pub fn new(params: &CamExecParams) -> Self {
        Self {
            width: params.stream_width.max(1),
            height: params.stream_height.max(1),
            quality: params.jpeg_quality.clamp(1, 100),
            period: Duration::from_secs(1) / params.frame_rate.max(1),
            next_at: Instant::now(),
            frame_num: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let shift = self.frame_num.wrapping_mul(4);
        let (width, height) = (self.width, self.height);

        RgbImage::from_fn(width, height, |x, y| {
            let pos = ((x.wrapping_add(shift) % width) * 256 / width) as u8;
            let shade = (y * 255 / height) as u8;
            Rgb([pos, 255 - pos, shade])
        })
    }
}

impl FrameSource for TestPattern {
    fn next_frame(&mut self) -> Result<Bytes, StreamError> {
        let now = Instant::now();
        if self.next_at > now {
            thread::sleep(self.next_at - now);
        }
        self.next_at = Instant::now().max(self.next_at) + self.period;

        let img = self.render();
        self.frame_num = self.frame_num.wrapping_add(1);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(img.as_raw(), self.width, self.height, ColorType::Rgb8)
            .map_err(|e| StreamError::Encode(e.to_string()))?;

        Ok(Bytes::from(jpeg))
    }
}

#[cfg(feature = "hw")]
impl V4l2Source {
    pub fn new(params: &CamExecParams) -> Result<Self, StreamError> {
        let mut camera = rscam::Camera::new(&params.video_device)
            .map_err(|e| StreamError::Open(e.to_string()))?;

        camera
            .start(&rscam::Config {
                interval: (1, params.frame_rate.max(1)),
                resolution: (params.stream_width, params.stream_height),
                format: b"MJPG",
                ..Default::default()
            })
            .map_err(|e| StreamError::Open(e.to_string()))?;

        Ok(Self { camera })
    }
}

#[cfg(feature = "hw")]
impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> Result<Bytes, StreamError> {
        let frame = self
            .camera
            .capture()
            .map_err(|e| StreamError::Capture(e.to_string()))?;

        Ok(Bytes::copy_from_slice(&frame[..]))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Publish frames from `source` until the shutdown flag is set.
pub fn run_producer<S: FrameSource>(mut source: S, relay: FrameRelay, shutdown: &AtomicBool) {
    let mut num_frames: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(f) => {
                relay.publish(f);
                num_frames += 1;
            }
            Err(e) => {
                warn!("{}", e);
                thread::sleep(RETRY_PERIOD);
            }
        }
    }

    debug!("Frame producer stopped after {} frames", num_frames);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn small_params() -> CamExecParams {
        CamExecParams {
            stream_width: 32,
            stream_height: 24,
            frame_rate: 100,
            ..CamExecParams::default()
        }
    }

    #[test]
    fn test_pattern_is_jpeg() {
        let mut src = TestPattern::new(&small_params());

        let a = src.next_frame().unwrap();
        let b = src.next_frame().unwrap();

        assert_eq!(&a[..2], &[0xFF, 0xD8]);
        assert_eq!(&a[a.len() - 2..], &[0xFF, 0xD9]);
        assert_ne!(a, b);

        let img = image::load_from_memory(&a).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (32, 24));
    }

    #[test]
    fn test_producer() {
        let relay = FrameRelay::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let r = relay.clone();
        let s = shutdown.clone();
        let producer = thread::spawn(move || {
            run_producer(TestPattern::new(&small_params()), r, &s)
        });

        thread::sleep(Duration::from_millis(100));
        shutdown.store(true, Ordering::Relaxed);
        producer.join().unwrap();

        assert!(relay.latest().is_some());
    }
}
