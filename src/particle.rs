use nalgebra::Vector3;

/// A point mass.
///
/// Particles are owned by the simulation's particle container; the octree
/// refers to them by index into that container, so a particle's identity is
/// stable across tree rebuilds while its position and velocity change
/// between steps.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    mass: f64,
    position: Vector3<f64>,
    velocity: Vector3<f64>,
}

impl Particle {
    pub fn new(mass: f64, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        debug_assert!(mass >= 0., "particle mass must be non-negative");
        Self {
            mass,
            position,
            velocity,
        }
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut Vector3<f64> {
        &mut self.position
    }

    pub fn velocity(&self) -> &Vector3<f64> {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut Vector3<f64> {
        &mut self.velocity
    }
}
