use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::Vector3;
use tracing::{info, warn};

use galaxy::{
    generate_initial, snapshot, zero_centre, Checkpoint, Gravity, Simulation, SimulationConfig,
    Step,
};

#[derive(Parser, Debug)]
#[command(about = "Barnes-Hut simulation of a self-gravitating star cluster")]
struct Args {
    /// Scenario file (YAML)
    #[arg(short, long, default_value = "galaxy.yaml")]
    config: PathBuf,

    /// Kill file polled between steps; the run stops and removes it when it
    /// appears
    #[arg(long, default_value = "kill")]
    killfile: PathBuf,
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let file =
        File::open(path).with_context(|| format!("cannot open scenario {}", path.display()))?;
    let config: SimulationConfig = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("cannot parse scenario {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn killed(killfile: &Path) -> bool {
    if !killfile.exists() {
        return false;
    }
    info!(path = %killfile.display(), "found killfile, stopping");
    if let Err(err) = fs::remove_file(killfile) {
        warn!(%err, "could not remove killfile");
    }
    true
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    fs::create_dir_all(&config.path)?;

    let checkpoint_path = config.checkpoint_path();
    let (particles, start_iter) = match Checkpoint::load(&checkpoint_path) {
        Ok(checkpoint) => {
            let next = checkpoint.iteration + 1;
            let mut particles = checkpoint.particles;
            zero_centre(&mut particles, config.need_to_zero, next);
            (particles, next)
        }
        Err(err) => {
            info!(%err, "no usable checkpoint, generating initial conditions");
            (generate_initial(&config), 0)
        }
    };

    let gravity = Gravity::new(config.g, config.theta, config.softening);
    let mut simulation = Simulation::new(particles, gravity);
    #[cfg(feature = "rayon")]
    {
        simulation = simulation.multithreaded();
    }

    let digits = config.snapshot_digits();
    let mut acceleration = vec![Vector3::zeros(); simulation.particles().len()];

    for iter in start_iter..config.max_iter {
        if killed(&args.killfile) {
            break;
        }

        simulation.step(config.dt, &mut acceleration, Step::from_index(iter, config.max_iter))?;

        if iter % config.img_iter == 0 {
            let image = snapshot::snapshot_path(&config.path, iter / config.img_iter, digits);
            snapshot::write_positions(simulation.particles(), &image)
                .with_context(|| format!("cannot write snapshot {}", image.display()))?;

            let checkpoint = Checkpoint {
                iteration: iter,
                theta: config.theta,
                g: config.g,
                dt: config.dt,
                particles: simulation.particles().to_vec(),
            };
            checkpoint.save(&checkpoint_path, &config.backup_suffix)?;
        }
    }

    let checkpoint = Checkpoint {
        iteration: config.max_iter.saturating_sub(1),
        theta: config.theta,
        g: config.g,
        dt: config.dt,
        particles: simulation.particles().to_vec(),
    };
    checkpoint.save(&checkpoint_path, &config.backup_suffix)?;

    info!("run complete");
    Ok(())
}
