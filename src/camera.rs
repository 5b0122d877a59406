use crate::math::*;
use crate::scene::CameraDesc;
use rand::Rng;

/// A pinhole camera. The constructor builds an orthonormal basis (u, v, w)
/// from the look-at parameters, then lays out a virtual pixel grid on the
/// focal plane; `get_ray` maps absolute pixel coordinates to jittered primary
/// rays. There is no lens model — every ray passes through the camera origin.
pub struct Camera {
    position: Point3,
    pixel00: Point3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
}

impl Camera {
    /// Constructs the camera for a given output resolution. The orthonormal basis is:
    ///   w = normalize(position - look_at)   (points backward, away from the scene)
    ///   u = normalize(up × w)               (points right)
    ///   v = w × u                           (points up, orthogonal to both)
    /// The focal plane sits at the look-at distance, clamped to 1 for
    /// degenerate position == look_at setups.
    pub fn new(desc: &CameraDesc, image_width: u32, image_height: u32) -> Self {
        let aspect_ratio = image_width as f64 / image_height as f64;

        let mut focus_dist = (desc.look_at - desc.position).length();
        if focus_dist < 1e-6 {
            focus_dist = 1.0;
        }

        let theta = desc.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h * focus_dist;
        let viewport_width = viewport_height * aspect_ratio;

        let w = (desc.position - desc.look_at).normalized();
        let u = desc.up.cross(w).normalized();
        let v = w.cross(u);

        let viewport_u = u * viewport_width;
        let viewport_v = v * viewport_height;

        let pixel_delta_u = viewport_u / image_width as f64;
        let pixel_delta_v = -viewport_v / image_height as f64;

        let viewport_upper_left =
            desc.position - w * focus_dist - viewport_u / 2.0 + viewport_v / 2.0;
        let pixel00 = viewport_upper_left + (pixel_delta_u + pixel_delta_v) * 0.5;

        Camera {
            position: desc.position,
            pixel00,
            pixel_delta_u,
            pixel_delta_v,
        }
    }

    /// Generates a primary ray through pixel (i, j) in absolute image
    /// coordinates, jittered uniformly within the pixel footprint for
    /// anti-aliasing.
    pub fn get_ray(&self, i: u32, j: u32, rng: &mut dyn rand::RngCore) -> Ray {
        let pixel_center =
            self.pixel00 + self.pixel_delta_u * i as f64 + self.pixel_delta_v * j as f64;
        let px = rng.gen::<f64>() - 0.5;
        let py = rng.gen::<f64>() - 0.5;
        let sample = pixel_center + self.pixel_delta_u * px + self.pixel_delta_v * py;
        Ray::new(self.position, sample - self.position)
    }
}
