use nalgebra::Point2;

use super::ray::{Intersect, Ray};

/// Base radius of a small track cone in meters.
pub const DEFAULT_CONE_RADIUS: f32 = 0.114;

/// A traffic cone, seen by the lidar as a circle in the scan plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Cone {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { x, y, radius }
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }

    pub fn contains(&self, p: Point2<f32>) -> bool {
        nalgebra::distance_squared(&self.center(), &p) <= self.radius * self.radius
    }
}

impl Intersect for Cone {
    fn intersect(&self, ray: &Ray) -> Option<f32> {
        // a sensor inside the cone sees nothing of it
        if self.contains(ray.origin()) {
            return None;
        }

        let oc = ray.origin() - self.center();
        let b = ray.direction().dot(&oc);
        let c = oc.norm_squared() - self.radius * self.radius;

        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        let u = -b - discriminant.sqrt();
        (u > 0.0).then_some(u)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn hit_front_face() {
        let cone = Cone::new(3.0, 0.0, 0.5);
        let ray = Ray::from_origin_angle(Point2::origin(), 0.0);

        assert_relative_eq!(cone.intersect(&ray).unwrap(), 2.5, epsilon = 1e-6);
    }

    #[test]
    fn miss_beside_and_behind() {
        let cone = Cone::new(3.0, 1.0, 0.5);
        assert!(cone
            .intersect(&Ray::from_origin_angle(Point2::origin(), 0.0))
            .is_none());

        let behind = Cone::new(-3.0, 0.0, 0.5);
        assert!(behind
            .intersect(&Ray::from_origin_angle(Point2::origin(), 0.0))
            .is_none());
    }

    #[test]
    fn origin_inside_is_ignored() {
        let cone = Cone::new(0.1, 0.0, 0.5);
        assert!(cone
            .intersect(&Ray::from_origin_angle(Point2::origin(), 0.0))
            .is_none());
        assert!(cone.contains(Point2::origin()));
    }
}
