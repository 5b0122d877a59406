use crate::camera::Camera;
use crate::encoding;
use crate::error::Error;
use crate::math::Color;
use crate::protocol::{HealthStatus, RpcError, Status, TileResult};
use crate::renderer::Renderer;
use crate::scene::Hittable;
use crate::transport::Client;
use log::{info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One registration's worth of worker state: the identity the coordinator
/// knows us by, plus the scene graph and camera rebuilt from the registration
/// payload. Immutable until a re-registration replaces the whole thing.
struct Session {
    worker_id: String,
    renderer: Renderer,
}

/// Deterministic per-task seed so a reclaimed tile re-rendered by another
/// worker produces byte-identical pixels.
fn task_seed(task_id: i32) -> u64 {
    task_id as u64 * 7919 + 17
}

/// Quantizes linear colors to the wire format, `floor(255.999 · channel)`
/// per byte. Out-of-range channels saturate.
fn encode_pixels(pixels: &[Color]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pixels.len() * 3);
    for pixel in pixels {
        bytes.push((255.999 * pixel.x) as u8);
        bytes.push((255.999 * pixel.y) as u8);
        bytes.push((255.999 * pixel.z) as u8);
    }
    bytes
}

fn establish(client: &Client, hostname: &str) -> Result<Session, Error> {
    let (worker_id, scene_bytes, config) = client
        .register_worker(hostname)
        .map_err(|e| Error::Fatal(format!("registration failed: {e}")))?;

    let (root, camera_desc) = encoding::decode(&scene_bytes)?;
    let world = root.unwrap_or_else(|| Arc::new(Hittable::List(Vec::new())));
    let camera = Camera::new(&camera_desc, config.image_width, config.image_height);

    info!(
        "registered as {worker_id}: {}x{} image, {} spp",
        config.image_width, config.image_height, config.samples_per_pixel
    );
    Ok(Session {
        worker_id,
        renderer: Renderer::new(camera, world),
    })
}

/// The worker entry point: register, verify the coordinator is serving, then
/// pull-render-submit until the queue is drained.
pub fn run(address: &str) -> Result<(), Error> {
    let client = Client::new(address);
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    run_with_client(&client, &hostname)
}

pub fn run_with_client(client: &Client, hostname: &str) -> Result<(), Error> {
    let mut session = establish(client, hostname)?;

    match client.health_check() {
        Ok(HealthStatus::Serving) => {}
        Ok(_) => return Err(Error::Fatal("coordinator is not serving".into())),
        Err(e) => return Err(Error::Fatal(format!("health check failed: {e}"))),
    }

    loop {
        match client.request_task(&session.worker_id) {
            Ok(None) => {
                info!("no more tiles to render, shutting down");
                return Ok(());
            }
            Ok(Some(task)) => {
                let tile = task.tile;
                let pixels = session.renderer.render_tile(
                    tile.x0,
                    tile.y0,
                    tile.width,
                    tile.height,
                    task.samples_per_pixel,
                    task.max_depth,
                    task_seed(tile.task_id),
                );
                let result = TileResult {
                    tile,
                    pixel_data: encode_pixels(&pixels),
                };

                match client.submit_result(&session.worker_id, result) {
                    Ok(()) => {}
                    Err(RpcError::Status(Status::Unauthenticated)) => {
                        // The coordinator has forgotten us (likely a restart);
                        // the stale lease will expire on its own.
                        warn!("submit rejected as unauthenticated, re-registering");
                        session = establish(client, hostname)?;
                    }
                    Err(e) => return Err(Error::Fatal(format!("submit failed: {e}"))),
                }
            }
            Err(RpcError::Status(Status::Unauthenticated)) => {
                warn!("request rejected as unauthenticated, re-registering");
                session = establish(client, hostname)?;
            }
            Err(e) => {
                warn!("task request failed ({e}), retrying in {RETRY_DELAY:?}");
                thread::sleep(RETRY_DELAY);
            }
        }
    }
}
