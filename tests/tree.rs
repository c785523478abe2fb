//! Node-count conservation.
//!
//! The live-node counter is process-wide, so these assertions live in their
//! own integration test binary where no other test builds a tree, and in a
//! single test function so they never observe each other's trees.

use galaxy::{live_nodes, Octree, Particle, PlummerSampler};
use nalgebra::Vector3;

fn particle(x: f64, y: f64, z: f64, mass: f64) -> Particle {
    Particle::new(mass, Vector3::new(x, y, z), Vector3::zeros())
}

#[test]
fn node_count_is_conserved() {
    assert_eq!(live_nodes(), 0);

    // Two particles separated along z split the root exactly once: the
    // root plus its eight children.
    {
        let particles = vec![particle(-1., -1., -1., 0.), particle(-1., -1., 1., 0.)];
        let tree = Octree::build(&particles).unwrap();
        assert_eq!(live_nodes(), 9);
        drop(tree);
    }
    assert_eq!(live_nodes(), 0);

    // Eight particles on the corners of a cube occupy one octant each.
    {
        let mut particles = Vec::new();
        for i in 0..8 {
            let x = if i & 4 != 0 { 1. } else { -1. };
            let y = if i & 2 != 0 { 1. } else { -1. };
            let z = if i & 1 != 0 { 1. } else { -1. };
            particles.push(particle(x, y, z, 1.));
        }
        let tree = Octree::build(&particles).unwrap();
        assert_eq!(live_nodes(), 9);

        assert_eq!(tree.root().mass(), 8.);
        assert!(tree.root().centre_of_mass().norm() < 1e-12);
    }
    assert_eq!(live_nodes(), 0);

    // A sampled cluster allocates an arbitrary shape and releases all of it.
    {
        let particles = PlummerSampler::new(1., 1., Some(7)).generate(100);
        let tree = Octree::build(&particles).unwrap();
        assert!(live_nodes() > 100);
        drop(tree);
    }
    assert_eq!(live_nodes(), 0);

    // A failed build must not leak the partially built tree either.
    {
        let particles = vec![particle(0., 0., 0., 1.), particle(0., 0., 0., 1.)];
        assert!(Octree::build(&particles).is_err());
    }
    assert_eq!(live_nodes(), 0);
}
