use anyhow::{bail, ensure};
use nalgebra::{Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A single lidar sweep as delivered by the simulator: a flat list of floats where
/// every consecutive triple is one `(x, y, z)` return, in scan order, in the vehicle frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LidarReading {
    pub point_cloud: Vec<f32>,
}

impl LidarReading {
    pub fn new(point_cloud: Vec<f32>) -> Self {
        Self { point_cloud }
    }

    /// Number of complete returns in the reading.
    pub fn len(&self) -> usize {
        self.point_cloud.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.point_cloud.len() < 3
    }

    /// Splits the flat buffer into 3D points. Fails if the buffer is not made of whole triples.
    pub fn points(&self) -> anyhow::Result<Vec<Point3<f32>>> {
        ensure!(
            self.point_cloud.len() % 3 == 0,
            "Malformed point cloud: {} floats is not a multiple of 3",
            self.point_cloud.len()
        );

        Ok(self
            .point_cloud
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect())
    }

    /// Projects every return onto the ground plane, keeping the scan order.
    pub fn points_xy(&self) -> anyhow::Result<Vec<Point2<f32>>> {
        Ok(self.points()?.iter().map(|p| p.xy()).collect())
    }
}

/// Navigation reading. Only the velocity is consumed by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpsReading {
    /// Position in the world frame (meters).
    pub position: Vector3<f32>,

    /// Velocity in the world frame (meters/second).
    pub velocity: Vector3<f32>,
}

impl GpsReading {
    /// The horizontal velocity components.
    pub fn planar_velocity(&self) -> Vector2<f32> {
        self.velocity.xy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageType {
    Scene,
}

/// Request for a single camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub camera_name: String,
    pub image_type: ImageType,
    pub pixels_as_float: bool,
    pub compress: bool,
}

impl ImageRequest {
    pub fn scene(camera_name: &str) -> Self {
        Self {
            camera_name: camera_name.to_owned(),
            image_type: ImageType::Scene,
            pixels_as_float: false,
            compress: true,
        }
    }
}

/// Raw camera frame, 8-bit RGB, row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageResponse {
    pub camera_name: String,
    pub image_data_uint8: Vec<u8>,
    pub height: usize,
    pub width: usize,
}

impl ImageResponse {
    pub const CHANNELS: usize = 3;

    /// Checks that the buffer matches the announced dimensions.
    pub fn validate(&self) -> anyhow::Result<()> {
        let expected = self.height * self.width * Self::CHANNELS;
        if self.image_data_uint8.len() != expected {
            bail!(
                "Camera '{}' returned {} bytes, expected {}x{}x{} = {}",
                self.camera_name,
                self.image_data_uint8.len(),
                self.height,
                self.width,
                Self::CHANNELS,
                expected
            );
        }
        Ok(())
    }
}
