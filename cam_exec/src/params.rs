//! # Camera Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CamExecParams {
    /// Address the stream server binds to
    pub bind_addr: String,

    /// Port the stream server listens on
    pub port: u16,

    /// Path of the MJPEG stream, the root path redirects here
    pub stream_path: String,

    /// Linux device path of the camera
    pub video_device: String,

    /// Width of the stream in pixels
    pub stream_width: u32,

    /// Height of the stream in pixels
    pub stream_height: u32,

    /// Capture rate.
    ///
    /// Units: frames per second
    pub frame_rate: u32,

    /// JPEG quality of generated frames, 1 to 100
    pub jpeg_quality: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CamExecParams {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            stream_path: "/stream.mjpg".into(),
            video_device: "/dev/video0".into(),
            stream_width: 640,
            stream_height: 480,
            frame_rate: 30,
            jpeg_quality: 60,
        }
    }
}

impl CamExecParams {
    /// The `addr:port` string to bind to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shipped_params() {
        let p: CamExecParams = util::params::load_from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../params/cam_exec.toml"
        ))
        .unwrap();

        assert_eq!(p.endpoint(), "0.0.0.0:8080");
        assert_eq!((p.stream_width, p.stream_height), (640, 480));
    }
}
