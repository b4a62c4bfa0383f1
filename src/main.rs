use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Stdout carries the picture, so logs go to stderr and default to warnings.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();

    let cfg = milkwarp::config::Config::parse();
    if cfg.list_devices {
        milkwarp::audio::list_input_devices()?;
        return Ok(());
    }

    milkwarp::app::run(cfg)
}
