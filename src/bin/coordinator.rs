use anyhow::Context;
use clap::Parser;
use photon_farm::coordinator::Coordinator;
use photon_farm::protocol::{RenderConfig, DEFAULT_PORT};
use photon_farm::scene::build_bvh;
use photon_farm::{encoding, scene_file, transport};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// photon-farm coordinator — serve a render to a pool of workers
#[derive(Parser, Debug)]
#[command(
    name = "photon-coordinator",
    version,
    about = "The coordinator node for the photon-farm distributed path tracer",
    long_about = "Parses a scene, cuts the image into tiles, and serves them to \
                  photon-worker processes over TCP. Workers can join and crash at \
                  any time; leases on their tiles expire and the tiles are \
                  re-dispatched. Once every tile is in, the image is written as \
                  PPM and the process exits."
)]
struct Cli {
    /// Scene file path
    #[arg(short, long)]
    scene: PathBuf,

    /// Output image file path
    #[arg(short, long, default_value = "output.ppm")]
    output: PathBuf,

    /// Image width in pixels
    #[arg(short, long, default_value_t = 1200)]
    width: u32,

    /// Image height in pixels
    #[arg(short = 'H', long, default_value_t = 800)]
    height: u32,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Samples per pixel — higher values reduce noise at the cost of render time
    #[arg(long, default_value_t = 100)]
    samples: u32,

    /// Maximum ray bounce depth
    #[arg(long, default_value_t = 50)]
    depth: u32,

    /// Edge length of the square render tiles
    #[arg(long, default_value_t = 64)]
    tile_size: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut scene = scene_file::load_scene(&cli.scene)
        .with_context(|| format!("failed to read scene {}", cli.scene.display()))?;

    let root = if scene.objects.is_empty() {
        None
    } else {
        Some(build_bvh(&mut scene.objects))
    };
    let scene_bytes =
        encoding::encode(root.as_ref(), &scene.camera).context("failed to encode scene")?;

    let config = RenderConfig {
        image_width: cli.width,
        image_height: cli.height,
        tile_size: cli.tile_size,
        samples_per_pixel: cli.samples,
        max_depth: cli.depth,
    };
    let coordinator = Arc::new(Coordinator::new(scene_bytes, config));

    let address = format!("0.0.0.0:{}", cli.port);
    let listener = TcpListener::bind(&address)
        .with_context(|| format!("failed to listen on {address}"))?;
    eprintln!("coordinator listening on {address}");

    let server = coordinator.clone();
    thread::spawn(move || {
        if let Err(e) = transport::serve(listener, server) {
            eprintln!("server loop failed: {e}");
            std::process::exit(1);
        }
    });

    coordinator.wait_for_completion();
    coordinator
        .write_image(&cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    eprintln!("all tiles rendered, image saved to {}", cli.output.display());

    Ok(())
}
