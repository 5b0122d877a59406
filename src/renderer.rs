use crate::camera::Camera;
use crate::math::*;
use crate::scene::Hittable;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// Self-intersection epsilon: rays start slightly off the surface they
/// scattered from so floating-point jitter cannot re-hit it at t ≈ 0.
const T_MIN: f64 = 0.005;

const BACKGROUND_HORIZON: Color = Color::new(1.0, 1.0, 1.0);
const BACKGROUND_SKY: Color = Color::new(0.5, 0.7, 1.0);

// ─── Framebuffer ────────────────────────────────────────────────────────────

/// The dense linear-space image buffer assembled on the coordinator. Tiles
/// write disjoint rectangles, so no per-pixel synchronization is needed
/// beyond what the owner provides.
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::zero(); (width * height) as usize],
        }
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.pixels[(y * self.width + x) as usize] = color;
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Export the framebuffer as a PPM (Portable Pixmap) image file.
    /// PPM P3 ASCII format: a text header followed by whitespace-separated
    /// RGB triples in row-major order. Gamma 2 is applied here — everything
    /// upstream stays in linear space.
    pub fn write_ppm(&self, path: &Path) -> io::Result<()> {
        let mut file = io::BufWriter::new(std::fs::File::create(path)?);
        write!(file, "P3\n{} {}\n255\n", self.width, self.height)?;
        for pixel in &self.pixels {
            write_color(&mut file, *pixel)?;
        }
        file.flush()
    }
}

/// Quantizes one linear color to a PPM text triple:
/// each channel is `floor(256 · clamp(sqrt(linear), 0, 0.999))`.
fn write_color(out: &mut impl Write, pixel: Color) -> io::Result<()> {
    const INTENSITY: Interval = Interval::new(0.0, 0.999);
    let r = (256.0 * INTENSITY.clamp(pixel.x.sqrt())) as i32;
    let g = (256.0 * INTENSITY.clamp(pixel.y.sqrt())) as i32;
    let b = (256.0 * INTENSITY.clamp(pixel.z.sqrt())) as i32;
    writeln!(out, "{r} {g} {b}")
}

// ─── Path Tracer ────────────────────────────────────────────────────────────

/// Monte Carlo path tracing integrator solving the rendering equation:
///   L_o(p, ω_o) = L_e(p, ω_o) + ∫_Ω f_r(p, ω_i, ω_o) · L_i(p, ω_i) · |cos θ_i| dω_i
/// via importance-sampling the BRDF at each bounce. One instance renders any
/// number of tiles; scene and camera are immutable after construction.
pub struct Renderer {
    camera: Camera,
    world: Arc<Hittable>,
}

impl Renderer {
    pub fn new(camera: Camera, world: Arc<Hittable>) -> Self {
        Self { camera, world }
    }

    /// Renders one tile and returns its pixels in row-major order.
    ///
    /// Scanlines fan out across the rayon pool; pixels within a scanline run
    /// sequentially. Each scanline owns an RNG seeded by `seed + scanline`,
    /// which makes the output bytes a pure function of `(tile, seed)` no
    /// matter how the pool schedules the rows — duplicate renders of a
    /// re-dispatched tile must be bit-identical.
    pub fn render_tile(
        &self,
        x0: u32,
        y0: u32,
        tile_width: u32,
        tile_height: u32,
        samples_per_pixel: u32,
        max_depth: u32,
        seed: u64,
    ) -> Vec<Color> {
        let mut pixels = vec![Color::zero(); (tile_width * tile_height) as usize];

        pixels
            .par_chunks_mut(tile_width as usize)
            .enumerate()
            .for_each(|(j, row)| {
                let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(j as u64));
                for (i, out) in row.iter_mut().enumerate() {
                    let mut pixel_color = Color::zero();
                    for _ in 0..samples_per_pixel {
                        let ray =
                            self.camera
                                .get_ray(x0 + i as u32, y0 + j as u32, &mut rng);
                        pixel_color += self.ray_color(&ray, max_depth, &mut rng);
                    }
                    *out = pixel_color / samples_per_pixel as f64;
                }
            });

        pixels
    }

    /// Traces a single ray recursively through the scene, accumulating
    /// radiance from emissive surfaces and scattered light. Rays that escape
    /// the scene sample the background gradient.
    fn ray_color(&self, ray: &Ray, depth: u32, rng: &mut SmallRng) -> Color {
        if depth == 0 {
            return Color::zero();
        }

        if let Some(hit) = self.world.hit(ray, Interval::new(T_MIN, f64::INFINITY)) {
            let emitted = hit.material.emitted();
            if let Some((scattered, attenuation)) = hit.material.scatter(ray, &hit, rng) {
                let incoming = self.ray_color(&scattered, depth - 1, rng);
                emitted + attenuation.hadamard(incoming)
            } else {
                emitted
            }
        } else {
            let unit_dir = ray.direction.normalized();
            let t = 0.5 * (unit_dir.y + 1.0);
            BACKGROUND_HORIZON.lerp(BACKGROUND_SKY, t)
        }
    }
}
