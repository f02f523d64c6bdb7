use common::{
    robot::{CarControls, Pose},
    sensor::{GpsReading, ImageResponse, LidarReading},
};
use nalgebra::{Point2, Vector3};
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;
use statrs::distribution::Normal;

use crate::scene::ray::{Intersect, Ray, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimParameters {
    /// Distance between the front and rear axle (meters).
    pub wheel_base: f32,

    /// Wheel angle (radians) reached at full steering.
    pub max_wheel_angle: f32,

    /// Acceleration (m/s^2) at full throttle.
    pub max_acceleration: f32,

    /// Deceleration (m/s^2) at full brake.
    pub max_deceleration: f32,

    /// Linear drag coefficient (1/s).
    pub drag: f32,

    /// Angular width of the lidar sweep, centered on the heading (degrees).
    pub lidar_fov: f32,

    /// Angle between two lidar rays (degrees).
    pub lidar_resolution: f32,

    /// Returns further away than this (meters) are not reported.
    pub lidar_range: f32,

    /// Standard deviation of the range noise added to every return (meters).
    pub lidar_noise_std: f32,

    pub camera_width: usize,
    pub camera_height: usize,
    pub pixels_per_meter: f32,
}

impl Default for SimParameters {
    fn default() -> Self {
        Self {
            wheel_base: 1.55,
            max_wheel_angle: 25f32.to_radians(),
            max_acceleration: 10.0,
            max_deceleration: 15.0,
            drag: 0.1,
            lidar_fov: 180.0,
            lidar_resolution: 0.25,
            lidar_range: 20.0,
            lidar_noise_std: 0.0,
            camera_width: 160,
            camera_height: 120,
            pixels_per_meter: 8.0,
        }
    }
}

impl SimParameters {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.wheel_base > 0.0, "wheel_base must be positive");
        anyhow::ensure!(
            self.lidar_resolution > 0.0,
            "lidar_resolution must be positive"
        );
        anyhow::ensure!(
            (0.0..=360.0).contains(&self.lidar_fov),
            "lidar_fov must be within [0, 360] degrees, got {}",
            self.lidar_fov
        );
        anyhow::ensure!(self.lidar_range > 0.0, "lidar_range must be positive");
        anyhow::ensure!(
            self.lidar_noise_std >= 0.0,
            "lidar_noise_std must not be negative"
        );
        anyhow::ensure!(
            self.camera_width > 0 && self.camera_height > 0,
            "camera size must be positive, got {}x{}",
            self.camera_width,
            self.camera_height
        );
        anyhow::ensure!(
            self.pixels_per_meter > 0.0,
            "pixels_per_meter must be positive"
        );
        Ok(())
    }
}

const BACKGROUND: [u8; 3] = [90, 90, 90];
const CONE_COLOR: [u8; 3] = [255, 140, 0];
const VEHICLE_COLOR: [u8; 3] = [30, 60, 220];

pub struct Simulator {
    scene: Scene,
    parameters: SimParameters,
    pose: Pose,
    speed: f32,
    controls: CarControls,
    noise: Option<Normal>,
    rng: StdRng,
    time: f64,
}

impl Simulator {
    pub fn new(
        scene: Scene,
        parameters: SimParameters,
        start: Pose,
        seed: u64,
    ) -> anyhow::Result<Self> {
        parameters.validate()?;

        let noise = if parameters.lidar_noise_std > 0.0 {
            Some(
                Normal::new(0.0, parameters.lidar_noise_std as f64)
                    .map_err(|e| anyhow::anyhow!("Invalid lidar noise: {e}"))?,
            )
        } else {
            None
        };

        Ok(Self {
            scene,
            parameters,
            pose: start,
            speed: 0.0,
            controls: CarControls::default(),
            noise,
            rng: StdRng::seed_from_u64(seed),
            time: 0.0,
        })
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Simulated seconds since start.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_controls(&mut self, controls: CarControls) {
        self.controls = controls;
    }

    /// Advances the kinematic bicycle model by `delta` seconds using the latest controls.
    pub fn tick(&mut self, delta: f32) {
        let p = &self.parameters;
        let steering = self.controls.steering.clamp(-1.0, 1.0);
        let throttle = self.controls.throttle.clamp(0.0, 1.0);
        let brake = self.controls.brake.clamp(0.0, 1.0);

        let acceleration = throttle * p.max_acceleration - p.drag * self.speed;
        self.speed = (self.speed + (acceleration - brake * p.max_deceleration) * delta).max(0.0);

        let wheel_angle = steering * p.max_wheel_angle;
        self.pose.theta += self.speed / p.wheel_base * wheel_angle.tan() * delta;
        self.pose.theta = normalize_angle(self.pose.theta);

        let (s, c) = self.pose.theta.sin_cos();
        self.pose.x += self.speed * c * delta;
        self.pose.y += self.speed * s * delta;

        self.time += delta as f64;
    }

    /// Casts one ray per resolution step across the field of view, from right to left.
    /// Returns are expressed in the vehicle frame; rays that hit nothing in range are
    /// left out.
    pub fn lidar_scan(&mut self) -> LidarReading {
        use rand::distributions::Distribution;

        let p = &self.parameters;
        let origin = Point2::new(self.pose.x, self.pose.y);
        let start = -p.lidar_fov.to_radians() / 2.0;
        let step = p.lidar_resolution.to_radians();
        let rays = (p.lidar_fov / p.lidar_resolution).round() as usize + 1;

        let mut point_cloud = Vec::with_capacity(rays * 3);

        for i in 0..rays {
            let angle = start + i as f32 * step;
            let ray = Ray::from_origin_angle(origin, self.pose.theta + angle);

            let Some(u) = self.scene.intersect(&ray) else {
                continue;
            };
            if u > p.lidar_range {
                continue;
            }

            let noise = self
                .noise
                .as_ref()
                .map_or(0.0, |n| n.sample(&mut self.rng) as f32);
            let distance = (u + noise).max(0.0);

            let (s, c) = angle.sin_cos();
            point_cloud.extend_from_slice(&[distance * c, distance * s, 0.0]);
        }

        LidarReading::new(point_cloud)
    }

    pub fn gps(&self) -> GpsReading {
        let (s, c) = self.pose.theta.sin_cos();
        GpsReading {
            position: Vector3::new(self.pose.x, self.pose.y, 0.0),
            velocity: Vector3::new(self.speed * c, self.speed * s, 0.0),
        }
    }

    /// Top-down view with the vehicle in the middle, facing the top of the image.
    pub fn render_camera(&self, camera_name: &str) -> ImageResponse {
        let p = &self.parameters;
        let (width, height) = (p.camera_width, p.camera_height);
        let ppm = p.pixels_per_meter;

        let mut data: Vec<u8> = BACKGROUND
            .iter()
            .copied()
            .cycle()
            .take(width * height * ImageResponse::CHANNELS)
            .collect();

        // vehicle frame x points up the image, y points left
        let to_pixel = |local: Point2<f32>| {
            (
                height as f32 / 2.0 - local.x * ppm,
                width as f32 / 2.0 - local.y * ppm,
            )
        };

        let mut fill_disc = |center: (f32, f32), radius: f32, color: [u8; 3]| {
            let (row, col) = center;
            let r0 = (row - radius).floor().max(0.0) as usize;
            let r1 = (row + radius).ceil().min(height as f32);
            let c0 = (col - radius).floor().max(0.0) as usize;
            let c1 = (col + radius).ceil().min(width as f32);
            if r1 <= 0.0 || c1 <= 0.0 {
                return;
            }

            for r in r0..r1 as usize {
                for c in c0..c1 as usize {
                    let dr = r as f32 + 0.5 - row;
                    let dc = c as f32 + 0.5 - col;
                    if dr * dr + dc * dc <= radius * radius {
                        let i = (r * width + c) * ImageResponse::CHANNELS;
                        data[i..i + ImageResponse::CHANNELS].copy_from_slice(&color);
                    }
                }
            }
        };

        for cone in self.scene.cones() {
            let local = self.pose.to_local(cone.center());
            fill_disc(to_pixel(local), (cone.radius * ppm).max(1.5), CONE_COLOR);
        }
        fill_disc(to_pixel(Point2::origin()), 0.5 * ppm, VEHICLE_COLOR);

        ImageResponse {
            camera_name: camera_name.to_owned(),
            image_data_uint8: data,
            height,
            width,
        }
    }
}

fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::PI;
    let a = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if a <= -PI {
        a + 2.0 * PI
    } else {
        a
    }
}
