//! Barnes-Hut simulation of a self-gravitating star cluster.
//!
//! Particles are sampled from a Plummer distribution, an adaptive octree is
//! rebuilt over their positions every step, and accelerations come from
//! traversing the tree with the opening-angle criterion instead of summing
//! all pairs. State can be checkpointed losslessly and restarted.
//!
//! # Example
//! ```
//! use galaxy::{Gravity, PlummerSampler, Simulation};
//!
//! let particles = PlummerSampler::new(1., 1., Some(42)).generate(100);
//! let mut simulation = Simulation::new(particles, Gravity::new(1., 0.5, 0.01));
//!
//! let positions = simulation.simulate(0.001, 10).unwrap();
//! assert_eq!(positions.nrows(), 11);
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod gravity;
pub mod octree;
pub mod particle;
pub mod plummer;
pub mod snapshot;

pub use checkpoint::Checkpoint;
pub use config::{Model, SimulationConfig};
pub use error::Error;
pub use gravity::{compute_accelerations, direct_accelerations, Gravity};
pub use octree::{live_nodes, Node, NodeStatus, Octree, Visit, Visitor};
pub use particle::Particle;
pub use plummer::{generate_initial, zero_centre, PlummerSampler};

use nalgebra::{DMatrix, Vector3};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Clone, Debug)]
enum Execution {
    SingleThreaded,
    #[cfg(feature = "rayon")]
    MultiThreaded,
}

/// Position of a step within the run, used to apply the half-step kicks at
/// either end of the leapfrog scheme.
#[derive(Copy, Clone, Debug)]
pub enum Step {
    First,
    Middle,
    Last,
}

impl Step {
    pub fn from_index(index: usize, num_steps: usize) -> Self {
        if index == 0 {
            Step::First
        } else if index + 1 == num_steps {
            Step::Last
        } else {
            Step::Middle
        }
    }
}

/// A running N-body simulation: the particle set plus the force-law
/// parameters, advanced by leapfrog integration over per-step trees.
#[derive(Debug)]
pub struct Simulation {
    particles: Vec<Particle>,
    gravity: Gravity,
    execution: Execution,
}

impl Simulation {
    pub fn new(particles: Vec<Particle>, gravity: Gravity) -> Self {
        Self {
            particles,
            gravity,
            execution: Execution::SingleThreaded,
        }
    }

    /// Evaluate forces on multiple threads.
    ///
    /// The tree is finished before the first query and read-only afterwards,
    /// so the per-particle evaluations are independent.
    #[cfg(feature = "rayon")]
    pub fn multithreaded(mut self) -> Self {
        self.execution = Execution::MultiThreaded;
        self
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Do a single step: rebuild the tree, evaluate accelerations into the
    /// caller's buffer, and advance positions and velocities.
    pub fn step(
        &mut self,
        time_step: f64,
        acceleration: &mut [Vector3<f64>],
        current_step: Step,
    ) -> Result<(), Error> {
        let tree = Octree::build(&self.particles)?;

        match self.execution {
            Execution::SingleThreaded => {
                gravity::compute_accelerations_into(
                    &tree,
                    &self.particles,
                    self.gravity,
                    acceleration,
                );
            }
            #[cfg(feature = "rayon")]
            Execution::MultiThreaded => {
                let particles = &self.particles;
                let gravity = self.gravity;
                acceleration.par_iter_mut().enumerate().for_each(|(i, a)| {
                    *a = gravity::acceleration_on(&tree, particles, i, gravity);
                });
            }
        }

        /*
         * Leapfrog integration:
         * v_(i + 1/2) = v_(i - 1/2) + a_i dt
         * x_(i + 1) = x_i + v_(i + 1/2) dt
         */
        for (particle, acc) in self.particles.iter_mut().zip(acceleration.iter()) {
            // in the first time step, need to get from v_0 to v_(1/2)
            if let Step::First = current_step {
                *particle.velocity_mut() += *acc * (time_step / 2.);
            } else {
                *particle.velocity_mut() += *acc * time_step;
            }

            let v = *particle.velocity();
            *particle.position_mut() += v * time_step;

            // in the last step, need to get from v_(n - 1/2) to v_n
            if let Step::Last = current_step {
                *particle.velocity_mut() += *acc * (time_step / 2.);
            }
        }

        Ok(())
    }

    /// Run `num_steps` steps and record the position history, one row per
    /// step including the initial state.
    pub fn simulate(
        &mut self,
        time_step: f64,
        num_steps: usize,
    ) -> Result<DMatrix<Vector3<f64>>, Error> {
        assert!(time_step > 0.);
        assert!(num_steps > 0);

        let n = self.particles.len();

        let mut positions = DMatrix::from_element(num_steps + 1, n, Vector3::zeros());
        for (particle, pos) in self.particles.iter().zip(positions.row_mut(0).iter_mut()) {
            *pos = *particle.position();
        }

        let mut acceleration = vec![Vector3::zeros(); n];

        for t in 0..num_steps {
            self.step(time_step, &mut acceleration, Step::from_index(t, num_steps))?;

            for (particle, pos) in self
                .particles
                .iter()
                .zip(positions.row_mut(t + 1).iter_mut())
            {
                *pos = *particle.position();
            }
        }

        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn equal_masses_fall_toward_each_other_symmetrically() {
        let particles = vec![
            Particle::new(1., Vector3::new(1., 0., 0.), Vector3::zeros()),
            Particle::new(1., Vector3::new(-1., 0., 0.), Vector3::zeros()),
        ];
        let mut simulation = Simulation::new(particles, Gravity::new(1., 0., 1e-4));

        let num_steps = 5;
        let positions = simulation.simulate(0.1, num_steps).unwrap();

        let first = positions.row(1);
        assert!(first[0].x < 1.);
        assert!(first[1].x > -1.);

        let last = positions.row(num_steps);
        assert_abs_diff_eq!(last[0].x, -last[1].x, epsilon = 1e-8);
        for p in &last {
            assert_abs_diff_eq!(p.y, 0., epsilon = 1e-8);
            assert_abs_diff_eq!(p.z, 0., epsilon = 1e-8);
        }
    }

    #[test]
    fn first_step_matches_direct_summation() {
        let particles = PlummerSampler::new(1., 1., Some(0)).generate(50);
        let gravity = Gravity::new(1., 0., 0.01);

        let exact = direct_accelerations(&particles, gravity);
        let expected: Vec<_> = particles
            .iter()
            .zip(&exact)
            .map(|(particle, acc)| {
                let dt = 0.01;
                let v = particle.velocity() + acc * (dt / 2.);
                particle.position() + v * dt
            })
            .collect();

        let mut simulation = Simulation::new(particles, gravity);
        let mut acceleration = vec![Vector3::zeros(); 50];
        simulation.step(0.01, &mut acceleration, Step::First).unwrap();

        for (particle, position) in simulation.particles().iter().zip(&expected) {
            assert_abs_diff_eq!((particle.position() - position).norm(), 0., epsilon = 1e-12);
        }
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn multithreaded_run_reproduces_the_single_threaded_one() {
        let particles = PlummerSampler::new(1., 1., Some(3)).generate(200);
        let gravity = Gravity::new(1., 0.5, 0.01);

        let mut single = Simulation::new(particles.clone(), gravity);
        let mut multi = Simulation::new(particles, gravity).multithreaded();

        let a = single.simulate(0.001, 5).unwrap();
        let b = multi.simulate(0.001, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn step_classification_covers_both_ends() {
        assert!(matches!(Step::from_index(0, 10), Step::First));
        assert!(matches!(Step::from_index(5, 10), Step::Middle));
        assert!(matches!(Step::from_index(9, 10), Step::Last));
    }
}
