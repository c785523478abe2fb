//! Checkpoint I/O.
//!
//! Checkpoints are line-oriented text files. Floating-point values are
//! stored as the decimal string of the unsigned 64-bit integer whose bit
//! pattern is the IEEE-754 binary64 representation, which is the only way
//! to round-trip the full mantissa (and NaN payloads) through text. The
//! layout is:
//!
//! ```text
//! Version=1.0
//! iteration=42
//! theta=<encoded double>
//! G=<encoded double>
//! dt=<encoded double>
//! <index>,<x>,<y>,<z>,<m>,<vx>,<vy>,<vz>
//! End
//! ```
//!
//! with one particle line per body, in insertion order.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::Error;
use crate::particle::Particle;

pub const VERSION: &str = "1.0";

/// Lossless text encoding of a double: the decimal form of its bit pattern.
pub fn encode(value: f64) -> String {
    value.to_bits().to_string()
}

/// Inverse of [`encode`].
pub fn decode(text: &str) -> Result<f64, Error> {
    text.trim()
        .parse::<u64>()
        .map(f64::from_bits)
        .map_err(|_| Error::Format(format!("not an encoded double: {text:?}")))
}

/// A restartable simulation state: the integrator scalars and the full
/// particle set at one iteration.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub iteration: usize,
    pub theta: f64,
    pub g: f64,
    pub dt: f64,
    pub particles: Vec<Particle>,
}

impl Checkpoint {
    /// Write the checkpoint to `path`.
    ///
    /// An existing file is first copied to a sibling backup path with
    /// `backup_suffix` appended. The new content goes to a temporary
    /// sibling and is renamed over the canonical path, so a crash mid-write
    /// never leaves a truncated checkpoint behind.
    pub fn save(&self, path: &Path, backup_suffix: &str) -> Result<(), Error> {
        if path.exists() {
            fs::copy(path, sibling(path, backup_suffix))?;
        }

        let temporary = sibling(path, ".tmp");
        {
            let mut file = BufWriter::new(File::create(&temporary)?);
            writeln!(file, "Version={VERSION}")?;
            writeln!(file, "iteration={}", self.iteration)?;
            writeln!(file, "theta={}", encode(self.theta))?;
            writeln!(file, "G={}", encode(self.g))?;
            writeln!(file, "dt={}", encode(self.dt))?;
            for (index, particle) in self.particles.iter().enumerate() {
                let pos = particle.position();
                let vel = particle.velocity();
                writeln!(
                    file,
                    "{},{},{},{},{},{},{},{}",
                    index,
                    encode(pos.x),
                    encode(pos.y),
                    encode(pos.z),
                    encode(particle.mass()),
                    encode(vel.x),
                    encode(vel.y),
                    encode(vel.z),
                )?;
            }
            writeln!(file, "End")?;
            file.flush()?;
        }
        fs::rename(&temporary, path)?;

        info!(
            iteration = self.iteration,
            bodies = self.particles.len(),
            path = %path.display(),
            "saved checkpoint"
        );
        Ok(())
    }

    /// Read a checkpoint back.
    ///
    /// Parsing is a linear state machine over the lines; a line that does
    /// not fit the expected record, a truncated file, or trailing content
    /// after `End` fails the whole load and discards any partial state.
    pub fn load(path: &Path) -> Result<Self, Error> {
        enum State {
            Version,
            Iteration,
            Theta,
            G,
            Dt,
            Body,
            Done,
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut state = State::Version;
        let mut iteration = 0;
        let mut theta = 0.;
        let mut g = 0.;
        let mut dt = 0.;
        let mut particles = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let number = index + 1;
            state = match state {
                State::Version => {
                    let version = value_of(&line, "Version", number)?;
                    debug!(version, "restoring checkpoint");
                    State::Iteration
                }
                State::Iteration => {
                    iteration = value_of(&line, "iteration", number)?
                        .parse()
                        .map_err(|_| format_error(number, "iteration is not an integer"))?;
                    State::Theta
                }
                State::Theta => {
                    theta = decode_field(&line, "theta", number)?;
                    State::G
                }
                State::G => {
                    g = decode_field(&line, "G", number)?;
                    State::Dt
                }
                State::Dt => {
                    dt = decode_field(&line, "dt", number)?;
                    State::Body
                }
                State::Body => {
                    if line == "End" {
                        State::Done
                    } else {
                        particles.push(parse_particle(&line, number)?);
                        State::Body
                    }
                }
                State::Done => {
                    if line.is_empty() {
                        State::Done
                    } else {
                        return Err(format_error(number, "unexpected text after End"));
                    }
                }
            };
        }

        if !matches!(state, State::Done) {
            return Err(Error::Format("checkpoint ends before the End marker".into()));
        }

        info!(
            iteration,
            bodies = particles.len(),
            path = %path.display(),
            "restored checkpoint"
        );
        Ok(Self {
            iteration,
            theta,
            g,
            dt,
            particles,
        })
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn format_error(line: usize, reason: impl std::fmt::Display) -> Error {
    Error::Format(format!("line {line}: {reason}"))
}

fn value_of<'a>(line: &'a str, key: &str, number: usize) -> Result<&'a str, Error> {
    line.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| format_error(number, format!("expected `{key}=`")))
}

fn decode_field(line: &str, key: &str, number: usize) -> Result<f64, Error> {
    decode(value_of(line, key, number)?)
        .map_err(|_| format_error(number, format!("{key} is not an encoded double")))
}

fn parse_particle(line: &str, number: usize) -> Result<Particle, Error> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 8 {
        return Err(format_error(number, "expected 8 comma-separated fields"));
    }
    fields[0]
        .parse::<usize>()
        .map_err(|_| format_error(number, "particle index is not an integer"))?;

    let mut values = [0f64; 7];
    for (value, field) in values.iter_mut().zip(&fields[1..]) {
        *value = decode(field).map_err(|_| format_error(number, "field is not an encoded double"))?;
    }
    let [x, y, z, m, vx, vy, vz] = values;
    Ok(Particle::new(
        m,
        Vector3::new(x, y, z),
        Vector3::new(vx, vy, vz),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            iteration: 42,
            theta: 0.5,
            g: 1.,
            dt: 0.001,
            particles: vec![Particle::new(
                1.,
                Vector3::new(1., 2., 3.),
                Vector3::new(-0.5, 0.25, 0.),
            )],
        }
    }

    #[test]
    fn encoding_preserves_every_bit_pattern() {
        let values = [
            0.,
            -0.,
            1.,
            -1.5,
            0.1,
            f64::MIN_POSITIVE,
            5e-324,
            f64::MAX,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::from_bits(0x7ff8_dead_beef_0001),
        ];
        for value in values {
            let text = encode(value);
            let back = decode(&text).unwrap();
            assert_eq!(back.to_bits(), value.to_bits(), "value {value:?}");
            assert_eq!(encode(back), text);
        }
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        let saved = checkpoint();
        saved.save(&path, "~").unwrap();
        let loaded = Checkpoint::load(&path).unwrap();

        assert_eq!(loaded.iteration, saved.iteration);
        assert_eq!(loaded.theta.to_bits(), saved.theta.to_bits());
        assert_eq!(loaded.g.to_bits(), saved.g.to_bits());
        assert_eq!(loaded.dt.to_bits(), saved.dt.to_bits());
        assert_eq!(loaded.particles, saved.particles);
    }

    #[test]
    fn one_particle_makes_a_seven_line_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        checkpoint().save(&path, "~").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], format!("Version={VERSION}"));
        assert_eq!(lines[1], "iteration=42");
        assert!(lines[2].starts_with("theta="));
        assert!(lines[3].starts_with("G="));
        assert!(lines[4].starts_with("dt="));
        assert!(lines[5].starts_with("0,"));
        assert_eq!(lines[6], "End");
    }

    #[test]
    fn saving_over_an_existing_file_backs_it_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        let mut first = checkpoint();
        first.save(&path, "~").unwrap();

        first.iteration = 43;
        first.save(&path, "~").unwrap();

        let backup = fs::read_to_string(dir.path().join("config.txt~")).unwrap();
        let current = fs::read_to_string(&path).unwrap();
        assert!(backup.contains("iteration=42"));
        assert!(current.contains("iteration=43"));
    }

    #[test]
    fn trailing_content_after_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        checkpoint().save(&path, "~").unwrap();
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("stray\n");
        fs::write(&path, content).unwrap();

        assert!(matches!(Checkpoint::load(&path), Err(Error::Format(_))));
    }

    #[test]
    fn truncated_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        checkpoint().save(&path, "~").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let without_end = content.trim_end_matches("End\n");
        fs::write(&path, without_end).unwrap();

        assert!(matches!(Checkpoint::load(&path), Err(Error::Format(_))));
    }

    #[test]
    fn non_numeric_field_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        checkpoint().save(&path, "~").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let corrupted = content.replacen("theta=", "theta=oops", 1);
        fs::write(&path, corrupted).unwrap();

        assert!(matches!(Checkpoint::load(&path), Err(Error::Format(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nowhere.txt");
        assert!(matches!(Checkpoint::load(&path), Err(Error::Io(_))));
    }
}
