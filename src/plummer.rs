use std::f64::consts::PI;

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use tracing::info;

use crate::config::{Model, SimulationConfig};
use crate::particle::Particle;

/// Samples particles from the Plummer model (density
/// `rho(r) ~ (1 + r^2/r0^2)^(-5/2)`), following the Aarseth-Henon-Wielen
/// recipe: radius by inverting the cumulative mass profile, velocity by
/// rejection sampling the dimensionless speed against the local escape
/// speed.
///
/// All draws come from a single generator in a fixed order, so a fixed seed
/// reproduces the same cluster on every run.
pub struct PlummerSampler {
    rng: StdRng,
    scale_radius: f64,
    total_mass: f64,
    mass_fraction: Uniform<f64>,
    cos_polar: Uniform<f64>,
    azimuth: Uniform<f64>,
    speed_fraction: Uniform<f64>,
    envelope: Uniform<f64>,
}

impl PlummerSampler {
    pub fn new(scale_radius: f64, total_mass: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            scale_radius,
            total_mass,
            // The lower cut keeps the innermost radii away from the
            // singular centre of the inverted profile.
            mass_fraction: Uniform::new(0.02, 1.),
            cos_polar: Uniform::new(-1., 1.),
            azimuth: Uniform::new(0., 2. * PI),
            speed_fraction: Uniform::new(0., 1.),
            envelope: Uniform::new(0., 0.1),
        }
    }

    /// Generate `n` equal-mass particles.
    pub fn generate(&mut self, n: usize) -> Vec<Particle> {
        if n == 0 {
            return Vec::new();
        }
        let mass = self.total_mass / n as f64;
        (0..n)
            .map(|_| {
                let radius = self.sample_radius();
                let position = self.isotropic(radius);
                let speed = self.sample_speed(radius);
                let velocity = self.isotropic(speed);
                Particle::new(mass, position, velocity)
            })
            .collect()
    }

    /// Invert the cumulative mass profile: a uniform mass fraction `u`
    /// maps to `r = r0 (u^(-2/3) - 1)^(-1/2)`.
    fn sample_radius(&mut self) -> f64 {
        let u = self.mass_fraction.sample(&mut self.rng);
        self.scale_radius / (u.powf(-2. / 3.) - 1.).sqrt()
    }

    /// Turn a length into a vector with that length and a uniformly random
    /// orientation.
    fn isotropic(&mut self, length: f64) -> Vector3<f64> {
        let cos_theta = self.cos_polar.sample(&mut self.rng);
        let sin_theta = (1. - cos_theta * cos_theta).sqrt();
        let phi = self.azimuth.sample(&mut self.rng);
        Vector3::new(
            length * sin_theta * phi.cos(),
            length * sin_theta * phi.sin(),
            length * cos_theta,
        )
    }

    /// Rejection-sample the speed as a fraction `q` of the local escape
    /// speed, with density `q^2 (1 - q^2)^(7/2)` on `[0, 1]`.
    fn sample_speed(&mut self, radius: f64) -> f64 {
        loop {
            let q = self.speed_fraction.sample(&mut self.rng);
            let y = self.envelope.sample(&mut self.rng);
            if y <= q * q * (1. - q * q).powf(3.5) {
                let escape = std::f64::consts::SQRT_2 * (1. + radius * radius).powf(-0.25);
                return q * escape;
            }
        }
    }
}

/// Create the particle set for the configured model, centred according to
/// the `needToZero` policy.
pub fn generate_initial(config: &SimulationConfig) -> Vec<Particle> {
    let mut particles = match config.model {
        Model::Plummer => {
            PlummerSampler::new(config.ini_radius, config.mass, config.seed).generate(config.numbodies)
        }
    };
    zero_centre(&mut particles, config.need_to_zero, 0);
    info!(bodies = particles.len(), "initialized particle set");
    particles
}

/// Shift positions so the centre of mass sits at the origin and velocities
/// so the total linear momentum vanishes.
///
/// The policy mirrors the `needToZero` configuration value: `0` never
/// centres, `1` centres only on the initial generation (`iteration == 0`),
/// anything larger centres on every invocation.
pub fn zero_centre(particles: &mut [Particle], policy: u32, iteration: usize) {
    if policy == 0 || (policy == 1 && iteration > 0) {
        return;
    }

    let total_mass: f64 = particles.iter().map(|p| p.mass()).sum();
    if total_mass == 0. {
        return;
    }

    let centre = particles
        .iter()
        .map(|p| p.position() * p.mass())
        .sum::<Vector3<f64>>()
        / total_mass;
    for particle in particles.iter_mut() {
        *particle.position_mut() -= centre;
    }

    let momentum = particles
        .iter()
        .map(|p| p.velocity() * p.mass())
        .sum::<Vector3<f64>>();
    let drift = momentum / total_mass;
    for particle in particles.iter_mut() {
        *particle.velocity_mut() -= drift;
    }
}
