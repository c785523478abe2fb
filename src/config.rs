//! Scenario configuration.
//!
//! A scenario is a small YAML document naming the initial distribution, the
//! cluster parameters, the force-law constants, and where checkpoints and
//! snapshots go. An example:
//!
//! ```yaml
//! model: plummer
//! numbodies: 1000
//! mass: 1.0
//! ini_radius: 1.0
//! needToZero: 1
//! theta: 0.5
//! G: 1.0
//! dt: 0.001
//! path: ./output
//! config_file_name: config.txt
//! max_iter: 10000
//! img_iter: 20
//! seed: 42
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Error;

/// Initial mass distribution.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum Model {
    #[serde(rename = "plummer")]
    Plummer,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimulationConfig {
    pub model: Model,
    /// Number of particles to generate.
    pub numbodies: usize,
    /// Total cluster mass, divided equally over the particles.
    pub mass: f64,
    /// Plummer scale radius.
    pub ini_radius: f64,
    /// Centring policy: 0 never, 1 on the initial generation only,
    /// 2 or more on every invocation.
    #[serde(rename = "needToZero")]
    pub need_to_zero: u32,
    /// Opening angle of the Barnes-Hut criterion.
    pub theta: f64,
    /// Gravitational constant, in simulation units.
    #[serde(rename = "G")]
    pub g: f64,
    /// Integrator time step.
    pub dt: f64,
    /// Directory for checkpoints and snapshots.
    pub path: PathBuf,
    /// Checkpoint file name within `path`.
    pub config_file_name: String,
    pub max_iter: usize,
    /// Snapshot (and checkpoint) cadence in iterations.
    pub img_iter: usize,
    /// Seed for the random generator; fresh entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_softening")]
    pub softening: f64,
    /// Suffix appended to the checkpoint path for the backup copy.
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
}

fn default_softening() -> f64 {
    0.01
}

fn default_backup_suffix() -> String {
    "~".to_string()
}

impl SimulationConfig {
    /// Fail fast on parameters no run could succeed with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.numbodies == 0 {
            return Err(Error::Config("numbodies must be positive".into()));
        }
        if self.mass <= 0. {
            return Err(Error::Config("mass must be positive".into()));
        }
        if self.ini_radius <= 0. {
            return Err(Error::Config("ini_radius must be positive".into()));
        }
        if !(0. ..=1.).contains(&self.theta) {
            return Err(Error::Config("theta must lie in [0, 1]".into()));
        }
        if self.dt <= 0. {
            return Err(Error::Config("dt must be positive".into()));
        }
        if self.img_iter == 0 {
            return Err(Error::Config("img_iter must be positive".into()));
        }
        Ok(())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.path.join(&self.config_file_name)
    }

    /// Zero-padding width for snapshot file names, wide enough for the
    /// highest snapshot number the run can produce and never narrower than
    /// five digits, so existing snapshot directories stay sorted.
    pub fn snapshot_digits(&self) -> usize {
        let images = (self.max_iter as f64 / self.img_iter as f64).ceil();
        (images.log10().ceil() as usize).max(5)
    }
}
