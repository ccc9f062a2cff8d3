//! Kindred - a reactive entity-component store
//!
//! This binary runs a small particle simulation on top of `kindred-ecs`.

mod settings;
mod simulation;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use settings::Settings;
use simulation::Simulation;

fn main() -> Result<()> {
    let loaded = Settings::load();
    let level = loaded
        .as_ref()
        .map(|s| s.logging.max_level())
        .unwrap_or(Level::INFO);

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let settings = loaded.unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        Settings::default()
    });

    info!("Starting Kindred simulation...");

    let mut rng = StdRng::from_entropy();
    let mut sim = Simulation::new(&settings, &mut rng).context("Failed to spawn particles")?;
    let total = sim
        .run(settings.simulation.ticks)
        .context("Simulation tick failed")?;

    info!(
        moved = total.moved,
        expired = total.expired,
        alive = sim.world().len(),
        trails = sim.trail_count(),
        sets = sim.world().set_count(),
        "Simulation finished"
    );
    Ok(())
}
