use crate::error::Error;
use crate::math::Color;
use crate::protocol::{HealthStatus, RenderConfig, RenderTask, Tile, TileResult};
use crate::renderer::Framebuffer;
use log::{info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(120);

/// A time-bounded assignment of one tile to one worker. Lives in the
/// in-progress table from dispatch until the result lands or the lease
/// expires and the task is requeued.
#[derive(Debug)]
pub struct Lease {
    pub task: RenderTask,
    pub worker_id: String,
    pub leased_at: Instant,
}

/// Everything the bookkeeping mutex guards. Tile pixel rectangles are
/// disjoint by construction, so the image writes need no finer locking.
struct CoordinatorState {
    work_queue: VecDeque<RenderTask>,
    in_progress: HashMap<i32, Lease>,
    registered_workers: HashSet<String>,
    image: Framebuffer,
}

/// Counts exposed for progress reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub total: usize,
}

/// The coordinator node: owns the tile queue, the worker registry, the lease
/// table, and the assembled image. One instance serves the whole render; the
/// transport adapter calls straight into these methods from its connection
/// threads.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    all_done: Condvar,
    tiles_completed: AtomicUsize,
    next_worker_id: AtomicU64,
    total_tiles: usize,
    scene_bytes: Vec<u8>,
    config: RenderConfig,
    lease_timeout: Duration,
}

/// What a successful registration hands back to the worker.
pub struct Registration {
    pub worker_id: String,
    pub scene_bytes: Vec<u8>,
    pub config: RenderConfig,
}

impl Coordinator {
    pub fn new(scene_bytes: Vec<u8>, config: RenderConfig) -> Self {
        Self::with_lease_timeout(scene_bytes, config, DEFAULT_LEASE_TIMEOUT)
    }

    /// The lease timeout is injectable so reclamation is testable without
    /// two minutes of wall clock.
    pub fn with_lease_timeout(
        scene_bytes: Vec<u8>,
        config: RenderConfig,
        lease_timeout: Duration,
    ) -> Self {
        let work_queue = build_work_queue(&config);
        let total_tiles = work_queue.len();
        info!("{total_tiles} tiles queued");

        Self {
            state: Mutex::new(CoordinatorState {
                work_queue,
                in_progress: HashMap::new(),
                registered_workers: HashSet::new(),
                image: Framebuffer::new(config.image_width, config.image_height),
            }),
            all_done: Condvar::new(),
            tiles_completed: AtomicUsize::new(0),
            next_worker_id: AtomicU64::new(0),
            total_tiles,
            scene_bytes,
            config,
            lease_timeout,
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::Serving
    }

    /// Admits a worker to the pool and hands it the scene and render
    /// configuration. The hostname is an opaque label; it only has to be
    /// non-empty.
    pub fn register_worker(&self, hostname: &str) -> Result<Registration, Error> {
        if hostname.is_empty() {
            return Err(Error::BadRequest("hostname must not be empty".into()));
        }
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker_id = format!("worker-{id}");

        let mut state = self.state.lock().unwrap();
        state.registered_workers.insert(worker_id.clone());
        drop(state);

        info!("registered {worker_id} ({hostname})");
        Ok(Registration {
            worker_id,
            scene_bytes: self.scene_bytes.clone(),
            config: self.config,
        })
    }

    /// Hands out the next tile, first sweeping expired leases back onto the
    /// queue tail. `Ok(None)` means the queue is drained — the worker should
    /// shut down (outstanding leases may still return or be reclaimed).
    pub fn request_task(&self, worker_id: &str) -> Result<Option<RenderTask>, Error> {
        let mut state = self.state.lock().unwrap();
        if !state.registered_workers.contains(worker_id) {
            return Err(Error::Unauthenticated);
        }

        self.reclaim_expired_locked(&mut state);

        let Some(task) = state.work_queue.pop_front() else {
            return Ok(None);
        };
        state.in_progress.insert(
            task.tile.task_id,
            Lease {
                task,
                worker_id: worker_id.to_string(),
                leased_at: Instant::now(),
            },
        );
        Ok(Some(task))
    }

    fn reclaim_expired_locked(&self, state: &mut CoordinatorState) {
        let now = Instant::now();
        let expired: Vec<i32> = state
            .in_progress
            .iter()
            .filter(|(_, lease)| now.duration_since(lease.leased_at) > self.lease_timeout)
            .map(|(task_id, _)| *task_id)
            .collect();
        for task_id in expired {
            if let Some(lease) = state.in_progress.remove(&task_id) {
                warn!(
                    "lease on task {task_id} held by {} expired, requeueing",
                    lease.worker_id
                );
                state.work_queue.push_back(lease.task);
            }
        }
    }

    /// Accepts a rendered tile. The lease must exist and belong to the
    /// caller; late duplicates from reclaimed workers bounce off with
    /// NOT_FOUND or PERMISSION_DENIED and leave the image untouched.
    pub fn submit_result(&self, worker_id: &str, result: &TileResult) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if !state.registered_workers.contains(worker_id) {
            return Err(Error::Unauthenticated);
        }

        let task_id = result.tile.task_id;
        let Some(lease) = state.in_progress.get(&task_id) else {
            return Err(Error::NotFound);
        };
        if lease.worker_id != worker_id {
            return Err(Error::PermissionDenied);
        }

        let tile = lease.task.tile;
        let expected = (tile.width * tile.height * 3) as usize;
        if result.pixel_data.len() != expected {
            return Err(Error::BadRequest(format!(
                "pixel buffer holds {} bytes, tile needs {expected}",
                result.pixel_data.len()
            )));
        }

        let mut i = 0;
        for y in 0..tile.height {
            for x in 0..tile.width {
                let color = Color::new(
                    result.pixel_data[i] as f64 / 255.999,
                    result.pixel_data[i + 1] as f64 / 255.999,
                    result.pixel_data[i + 2] as f64 / 255.999,
                );
                state.image.set(tile.x0 + x, tile.y0 + y, color);
                i += 3;
            }
        }

        state.in_progress.remove(&task_id);
        let completed = self.tiles_completed.fetch_add(1, Ordering::SeqCst) + 1;
        info!("progress: {completed} / {} tiles completed", self.total_tiles);
        if completed == self.total_tiles {
            self.all_done.notify_all();
        }
        Ok(())
    }

    /// Blocks the calling thread until every tile has been submitted.
    pub fn wait_for_completion(&self) {
        let mut state = self.state.lock().unwrap();
        while self.tiles_completed.load(Ordering::SeqCst) < self.total_tiles {
            state = self.all_done.wait(state).unwrap();
        }
    }

    pub fn write_image(&self, path: &Path) -> io::Result<()> {
        let state = self.state.lock().unwrap();
        state.image.write_ppm(path)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.state.lock().unwrap().image.get(x, y)
    }

    pub fn stats(&self) -> CoordinatorStats {
        let state = self.state.lock().unwrap();
        CoordinatorStats {
            queued: state.work_queue.len(),
            in_flight: state.in_progress.len(),
            completed: self.tiles_completed.load(Ordering::SeqCst),
            total: self.total_tiles,
        }
    }
}

/// Cuts the image into tiles in raster order, clipping the right and bottom
/// edges, and assigns dense task ids.
fn build_work_queue(config: &RenderConfig) -> VecDeque<RenderTask> {
    let mut queue = VecDeque::new();
    let mut task_id = 0i32;
    for y in (0..config.image_height).step_by(config.tile_size as usize) {
        for x in (0..config.image_width).step_by(config.tile_size as usize) {
            queue.push_back(RenderTask {
                tile: Tile {
                    x0: x,
                    y0: y,
                    width: config.tile_size.min(config.image_width - x),
                    height: config.tile_size.min(config.image_height - y),
                    task_id,
                },
                samples_per_pixel: config.samples_per_pixel,
                max_depth: config.max_depth,
            });
            task_id += 1;
        }
    }
    queue
}
