use clap::Parser;
use photon_farm::worker;

/// photon-farm worker — render tiles for a coordinator
#[derive(Parser, Debug)]
#[command(
    name = "photon-worker",
    version,
    about = "A worker node for the photon-farm distributed path tracer",
    long_about = "Connects to a photon-coordinator, receives the scene once, then \
                  pulls tiles, path-traces them, and submits the pixels until the \
                  coordinator runs out of work."
)]
struct Cli {
    /// Coordinator address
    #[arg(short, long, default_value = "localhost:50051")]
    address: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    eprintln!("worker connecting to coordinator at {}", cli.address);
    worker::run(&cli.address)?;
    Ok(())
}
