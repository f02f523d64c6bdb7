use std::f32::consts::{FRAC_PI_2, TAU};

use super::cone::{Cone, DEFAULT_CONE_RADIUS};

/// Cones along both edges of a circular track driven counter-clockwise.
///
/// The vehicle starts at the origin facing +x; the circle is centered at `(0, radius)`
/// so the first cones of the left and right edge sit at `(0, half_width)` and
/// `(0, -half_width)`.
pub fn circle_track(radius: f32, half_width: f32, spacing: f32) -> Vec<Cone> {
    let edge = |edge_radius: f32| {
        let count = (TAU * edge_radius / spacing).ceil().max(1.0) as usize;
        (0..count).map(move |k| {
            let phi = -FRAC_PI_2 + TAU * k as f32 / count as f32;
            Cone::new(
                edge_radius * phi.cos(),
                radius + edge_radius * phi.sin(),
                DEFAULT_CONE_RADIUS,
            )
        })
    };

    edge(radius - half_width)
        .chain(edge(radius + half_width))
        .collect()
}
