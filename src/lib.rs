//! # photon-farm 🔬
//!
//! A physically-based Monte Carlo path tracer that spreads one render across
//! a pool of machines: a coordinator cuts the image into tiles and leases
//! them out, workers trace rays over a shared scene and stream pixels back,
//! and the finished image lands on disk as a PPM.
//!
//! ## Architecture
//!
//! - **Geometric primitives**: Sphere and finite capped Cylinder with BVH
//!   acceleration (median split on the longest axis)
//! - **Materials**: Lambertian, Metal, Dielectric (glass), DiffuseLight
//! - **Camera**: pinhole model aimed via look-at parameters
//! - **Distribution**: leased tile dispatch with timeout reclamation over a
//!   small length-prefixed TCP protocol; scenes travel once per worker as a
//!   flat, sharing-preserving node list
//!
//! ## Rendering equation
//!
//! The path tracer solves the rendering equation via Monte Carlo integration:
//!
//! ```text
//!   L_o(p, ω_o) = L_e(p, ω_o) + ∫_Ω f_r(p, ω_i, ω_o) · L_i(p, ω_i) · |cos θ_i| dω_i
//! ```
//!
//! Each material's `scatter` method importance-samples its BRDF lobe, and the
//! integrator recursively traces the scattered ray to evaluate `L_i`. Tiles
//! are rendered deterministically from their task id, so a tile re-dispatched
//! after a worker failure converges to the exact same bytes.

pub mod camera;
pub mod coordinator;
pub mod encoding;
pub mod error;
pub mod math;
pub mod protocol;
pub mod renderer;
pub mod scene;
pub mod scene_file;
pub mod transport;
pub mod worker;
