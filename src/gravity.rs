use nalgebra::Vector3;

use crate::octree::{Node, NodeStatus, Octree, Visit, Visitor};
use crate::particle::Particle;

/// Parameters of the Newtonian force law shared by every query.
#[derive(Clone, Copy, Debug)]
pub struct Gravity {
    /// Gravitational constant, in simulation units.
    pub g: f64,
    /// Opening angle of the Barnes-Hut criterion.
    pub theta: f64,
    /// Softening length preventing singular forces at small separations.
    pub softening: f64,
}

impl Gravity {
    pub fn new(g: f64, theta: f64, softening: f64) -> Self {
        Self {
            g,
            theta,
            softening,
        }
    }
}

/// Accumulates the acceleration at one query point.
///
/// A cell of side `s` at distance `d` from the query is folded in as a
/// single point mass at its centre of mass when `s/d < theta` or the cell
/// is external; otherwise the traversal descends. The external cell holding
/// the query particle itself is skipped.
struct AccelerationVisitor {
    query: Vector3<f64>,
    skip: Option<usize>,
    gravity: Gravity,
    acceleration: Vector3<f64>,
}

impl AccelerationVisitor {
    fn accumulate(&mut self, node: &Node) {
        let r = node.centre_of_mass() - self.query;
        let distance_squared = r.norm_squared();
        let distance = distance_squared.sqrt();
        if distance == 0. {
            return;
        }
        let softening = self.gravity.softening;
        let magnitude_over_distance =
            self.gravity.g * node.mass() / ((distance_squared + softening * softening) * distance);
        self.acceleration += r * magnitude_over_distance;
    }
}

impl Visitor for AccelerationVisitor {
    fn visit(&mut self, node: &Node) -> Visit {
        match node.status() {
            NodeStatus::Unused => Visit::Sideways,
            NodeStatus::External(index) if Some(index) == self.skip => Visit::Sideways,
            NodeStatus::External(_) => {
                self.accumulate(node);
                Visit::Sideways
            }
            NodeStatus::Internal => {
                let distance = (node.centre_of_mass() - self.query).norm();
                if distance > 0. && node.side() / distance < self.gravity.theta {
                    self.accumulate(node);
                    Visit::Sideways
                } else {
                    Visit::Continue
                }
            }
        }
    }
}

/// Acceleration on one particle of the set the tree was built from,
/// excluding its self-interaction.
pub fn acceleration_on(
    tree: &Octree,
    particles: &[Particle],
    index: usize,
    gravity: Gravity,
) -> Vector3<f64> {
    let mut visitor = AccelerationVisitor {
        query: *particles[index].position(),
        skip: Some(index),
        gravity,
        acceleration: Vector3::zeros(),
    };
    tree.visit(&mut visitor);
    visitor.acceleration
}

/// Acceleration at an arbitrary point due to every particle in the tree.
pub fn acceleration_at(tree: &Octree, point: &Vector3<f64>, gravity: Gravity) -> Vector3<f64> {
    let mut visitor = AccelerationVisitor {
        query: *point,
        skip: None,
        gravity,
        acceleration: Vector3::zeros(),
    };
    tree.visit(&mut visitor);
    visitor.acceleration
}

/// Accelerations for all particles. Pure: neither the tree nor the
/// particles are mutated.
pub fn compute_accelerations(
    tree: &Octree,
    particles: &[Particle],
    gravity: Gravity,
) -> Vec<Vector3<f64>> {
    let mut accelerations = vec![Vector3::zeros(); particles.len()];
    compute_accelerations_into(tree, particles, gravity, &mut accelerations);
    accelerations
}

pub fn compute_accelerations_into(
    tree: &Octree,
    particles: &[Particle],
    gravity: Gravity,
    accelerations: &mut [Vector3<f64>],
) {
    for (index, acceleration) in accelerations.iter_mut().enumerate() {
        *acceleration = acceleration_on(tree, particles, index, gravity);
    }
}

/// Exact pairwise summation, used as the accuracy reference for the tree.
pub fn direct_accelerations(particles: &[Particle], gravity: Gravity) -> Vec<Vector3<f64>> {
    let softening_squared = gravity.softening * gravity.softening;
    particles
        .iter()
        .enumerate()
        .map(|(i, particle)| {
            let mut acceleration = Vector3::zeros();
            for (j, other) in particles.iter().enumerate() {
                if i == j {
                    continue;
                }
                let r = other.position() - particle.position();
                let distance_squared = r.norm_squared();
                let distance = distance_squared.sqrt();
                if distance == 0. {
                    continue;
                }
                acceleration +=
                    r * (gravity.g * other.mass() / ((distance_squared + softening_squared) * distance));
            }
            acceleration
        })
        .collect()
}
