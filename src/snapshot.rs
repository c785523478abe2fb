use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::particle::Particle;

/// File name of the `sequence`-th snapshot, zero-padded to `digits` so a
/// directory of snapshots sorts in generation order.
pub fn snapshot_path(dir: &Path, sequence: usize, digits: usize) -> PathBuf {
    dir.join(format!("bodies_{sequence:0digits$}.csv"))
}

/// Dump particle positions as CSV for offline analysis and rendering.
pub fn write_positions(particles: &[Particle], path: impl AsRef<Path>) -> Result<(), io::Error> {
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "x,y,z")?;
    for particle in particles {
        let pos = particle.position();
        writeln!(file, "{},{},{}", pos.x, pos.y, pos.z)?;
    }

    Ok(())
}
