use anyhow::ensure;
use common::sensor::ImageResponse;

/// A decoded 8-bit RGB camera frame, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl TryFrom<ImageResponse> for CameraFrame {
    type Error = anyhow::Error;

    fn try_from(response: ImageResponse) -> anyhow::Result<Self> {
        response.validate()?;
        ensure!(
            response.width > 0 && response.height > 0,
            "Camera '{}' returned an empty frame",
            response.camera_name
        );

        Ok(Self {
            width: response.width,
            height: response.height,
            data: response.image_data_uint8,
        })
    }
}

impl CameraFrame {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Average color over all pixels.
    pub fn mean_color(&self) -> [f32; 3] {
        let mut sum = [0u64; 3];
        for px in self.data.chunks_exact(ImageResponse::CHANNELS) {
            for (s, &v) in sum.iter_mut().zip(px) {
                *s += v as u64;
            }
        }
        let n = (self.width * self.height) as f32;
        sum.map(|s| s as f32 / n)
    }
}

/// Receives every camera frame the loop fetches. Frames are for display only.
pub trait FrameSink {
    fn show(&mut self, frame: &CameraFrame) -> anyhow::Result<()>;
}

/// Logs a one-line summary of each frame.
#[derive(Debug, Default)]
pub struct TracingSink {
    frames: u64,
}

impl TracingSink {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for TracingSink {
    fn show(&mut self, frame: &CameraFrame) -> anyhow::Result<()> {
        self.frames += 1;
        let [r, g, b] = frame.mean_color();
        tracing::trace!(
            "Frame {}: {}x{}, mean color ({r:.0}, {g:.0}, {b:.0})",
            self.frames,
            frame.width(),
            frame.height()
        );
        Ok(())
    }
}
