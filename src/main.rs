use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pocketwm::core::config::{Args, WmConfig};
use pocketwm::display::x11::X11DisplayServer;
use pocketwm::window::manager::WindowManager;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = WmConfig::from(&args);
    info!(?config, "starting pocketwm");

    let srv = X11DisplayServer::open(args.replace)?;
    let mut manager = WindowManager::new(srv, config);
    manager.startup()?;
    manager.run()?;

    info!("shut down cleanly");
    Ok(())
}
