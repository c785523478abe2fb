use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Vector3;

use crate::error::Error;
use crate::particle::Particle;

/// Padding added past the extremal coordinates on both sides of the root
/// bounding box, so every particle lies strictly inside it.
const BOX_MARGIN: f64 = 1e-4;

static LIVE_NODES: AtomicUsize = AtomicUsize::new(0);

/// Number of currently allocated tree nodes, process-wide.
///
/// Every [`Node`] increments this counter on construction and decrements it
/// on drop, which makes leak detection a plain equality check in tests.
pub fn live_nodes() -> usize {
    LIVE_NODES.load(Ordering::Relaxed)
}

/// What a cell currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// Freshly constructed empty cell.
    Unused,
    /// Exactly one particle, identified by its index into the particle slice.
    External(usize),
    /// A subdivided cell with eight children.
    Internal,
}

/// Flow control returned by [`Visitor::visit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// Terminate the traversal immediately.
    Stop,
    /// Descend into the children, in child-key order.
    Continue,
    /// Skip this subtree and proceed to the next sibling.
    Sideways,
}

/// Depth-first traversal hooks.
///
/// `visit` runs on entry to a node. `propagate` runs on the parent after each
/// child subtree has been visited, before moving to the next sibling, which
/// lets a visitor fold child results back into per-parent scratch state.
/// `depart` runs on exit from a node whose children were descended into;
/// returning `false` ends the traversal entirely.
pub trait Visitor {
    fn visit(&mut self, node: &Node) -> Visit;

    fn propagate(&mut self, _node: &Node, _child: &Node) {}

    fn depart(&mut self, _node: &Node) -> bool {
        true
    }
}

type Children = Box<[Node; 8]>;

/// One cubic cell of the octree.
///
/// The bounding box is fixed at construction; subdividing a cell produces
/// eight children whose boxes are the equal octants of the parent, so sides
/// halve at each depth. Aggregated mass and centre of mass are filled in by
/// a post-order pass once all particles are inserted.
#[derive(Debug)]
pub struct Node {
    min: Vector3<f64>,
    max: Vector3<f64>,
    mid: Vector3<f64>,
    status: NodeStatus,
    children: Option<Children>,
    mass: f64,
    centre_of_mass: Vector3<f64>,
}

impl Node {
    fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        LIVE_NODES.fetch_add(1, Ordering::Relaxed);
        let mid = (min + max) * 0.5;
        Self {
            min,
            max,
            mid,
            status: NodeStatus::Unused,
            children: None,
            mass: 0.,
            centre_of_mass: mid,
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn centre_of_mass(&self) -> Vector3<f64> {
        self.centre_of_mass
    }

    pub fn min(&self) -> Vector3<f64> {
        self.min
    }

    pub fn max(&self) -> Vector3<f64> {
        self.max
    }

    pub fn mid(&self) -> Vector3<f64> {
        self.mid
    }

    /// Side length of the (cubic) bounding box.
    pub fn side(&self) -> f64 {
        self.max.x - self.min.x
    }

    fn insert(&mut self, index: usize, particles: &[Particle], min_side: f64) -> Result<(), Error> {
        match self.status {
            NodeStatus::Unused => {
                let particle = &particles[index];
                self.mass = particle.mass();
                self.centre_of_mass = *particle.position();
                self.status = NodeStatus::External(index);
                Ok(())
            }
            NodeStatus::External(incumbent) => {
                // Coincident particles would push the split below any
                // resolvable cell size and recurse forever.
                if self.side() * 0.5 < min_side {
                    return Err(Error::CoincidentParticles {
                        a: incumbent,
                        b: index,
                    });
                }
                self.split();
                self.insert_or_propagate(index, incumbent, particles, min_side)
            }
            NodeStatus::Internal => {
                let octant = octant_index(&self.mid, particles[index].position());
                self.child_mut(octant).insert(index, particles, min_side)
            }
        }
    }

    /// Convert an external cell into an internal one with eight empty
    /// children covering its octants.
    fn split(&mut self) {
        let children = Box::new(std::array::from_fn(|key| {
            let (min, max) = octant_bounds(&self.min, &self.max, &self.mid, key);
            Node::new(min, max)
        }));
        self.children = Some(children);
        self.status = NodeStatus::Internal;
    }

    /// Place the new particle and the incumbent of a just-split cell. If
    /// both land in the same octant, inserting the second one splits that
    /// child in turn and the pair is passed down until they separate.
    fn insert_or_propagate(
        &mut self,
        index: usize,
        incumbent: usize,
        particles: &[Particle],
        min_side: f64,
    ) -> Result<(), Error> {
        let new_octant = octant_index(&self.mid, particles[index].position());
        let old_octant = octant_index(&self.mid, particles[incumbent].position());
        if new_octant == old_octant {
            self.child_mut(new_octant)
                .insert(incumbent, particles, min_side)?;
            self.child_mut(new_octant).insert(index, particles, min_side)
        } else {
            self.child_mut(new_octant).insert(index, particles, min_side)?;
            self.child_mut(old_octant)
                .insert(incumbent, particles, min_side)
        }
    }

    fn child_mut(&mut self, octant: usize) -> &mut Node {
        match &mut self.children {
            Some(children) => &mut children[octant],
            None => unreachable!("child access on an unsplit cell"),
        }
    }

    /// Post-order pass filling in mass and centre of mass for internal
    /// cells. External cells were set on insertion; unused cells stay empty.
    fn aggregate(&mut self) {
        if let Some(children) = &mut self.children {
            let mut mass = 0.;
            let mut moment = Vector3::zeros();
            for child in children.iter_mut() {
                child.aggregate();
                mass += child.mass;
                moment += child.centre_of_mass * child.mass;
            }
            self.mass = mass;
            self.centre_of_mass = if mass > 0. { moment / mass } else { self.mid };
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        LIVE_NODES.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Child key `4i + 2j + k` where `i`, `j`, `k` flag the high half of the
/// x, y, z axis respectively.
fn octant_index(mid: &Vector3<f64>, position: &Vector3<f64>) -> usize {
    let i = usize::from(position.x >= mid.x);
    let j = usize::from(position.y >= mid.y);
    let k = usize::from(position.z >= mid.z);
    4 * i + 2 * j + k
}

fn octant_bounds(
    min: &Vector3<f64>,
    max: &Vector3<f64>,
    mid: &Vector3<f64>,
    key: usize,
) -> (Vector3<f64>, Vector3<f64>) {
    let mut lower = *min;
    let mut upper = *mid;
    if key & 4 != 0 {
        lower.x = mid.x;
        upper.x = max.x;
    }
    if key & 2 != 0 {
        lower.y = mid.y;
        upper.y = max.y;
    }
    if key & 1 != 0 {
        lower.z = mid.z;
        upper.z = max.z;
    }
    (lower, upper)
}

/// Cubic bounding box around all particles, padded so none of them sits on
/// a boundary. The shorter axes are widened about their midpoints until the
/// box has equal sides.
fn bounds(particles: &[Particle]) -> (Vector3<f64>, Vector3<f64>) {
    if particles.is_empty() {
        return (Vector3::repeat(-0.5), Vector3::repeat(0.5));
    }

    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);
    for particle in particles {
        for (axis, elem) in particle.position().iter().enumerate() {
            if *elem < min[axis] {
                min[axis] = *elem;
            }
            if *elem > max[axis] {
                max[axis] = *elem;
            }
        }
    }
    min -= Vector3::repeat(BOX_MARGIN);
    max += Vector3::repeat(BOX_MARGIN);

    let side = (max - min).max();
    for axis in 0..3 {
        let mid = (min[axis] + max[axis]) * 0.5;
        min[axis] = mid - side * 0.5;
        max[axis] = mid + side * 0.5;
    }
    (min, max)
}

/// Barnes-Hut octree over a particle slice.
///
/// The tree holds indices into the slice it was built from, never the
/// particles themselves; it is rebuilt from current positions each step and
/// dropped before the next rebuild. Dropping the root releases every node.
#[derive(Debug)]
pub struct Octree {
    root: Node,
}

impl Octree {
    /// Build a tree over the current particle positions.
    ///
    /// Fails with [`Error::CoincidentParticles`] if two particles sit so
    /// close together that separating them would subdivide cells below
    /// machine resolution.
    pub fn build(particles: &[Particle]) -> Result<Self, Error> {
        let (min, max) = bounds(particles);
        let mut root = Node::new(min, max);
        let min_side = root.side() * f64::EPSILON;
        for index in 0..particles.len() {
            root.insert(index, particles, min_side)?;
        }
        root.aggregate();
        Ok(Self { root })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Walk the tree depth-first, left-to-right over the child keys.
    pub fn visit<V: Visitor>(&self, visitor: &mut V) {
        visit_node(&self.root, visitor);
    }

    /// Check that every internal cell's aggregates equal the sums over its
    /// children, within `1e-9` of the total mass.
    pub fn verify(&self) -> Result<(), Error> {
        let mut audit = MassAudit {
            tolerance: 1e-9 * self.root.mass(),
            stack: Vec::new(),
            failure: None,
        };
        self.visit(&mut audit);
        match audit.failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn visit_node<V: Visitor>(node: &Node, visitor: &mut V) -> bool {
    match visitor.visit(node) {
        Visit::Stop => return false,
        Visit::Sideways => return true,
        Visit::Continue => {}
    }
    if let Some(children) = &node.children {
        for child in children.iter() {
            if !visit_node(child, visitor) {
                return false;
            }
            visitor.propagate(node, child);
        }
    }
    visitor.depart(node)
}

/// Compares each internal cell's stored aggregates against the sums folded
/// up from its children via `propagate`.
struct MassAudit {
    tolerance: f64,
    stack: Vec<(f64, Vector3<f64>)>,
    failure: Option<Error>,
}

impl Visitor for MassAudit {
    fn visit(&mut self, node: &Node) -> Visit {
        match node.status() {
            NodeStatus::Internal => {
                self.stack.push((0., Vector3::zeros()));
                Visit::Continue
            }
            _ => Visit::Sideways,
        }
    }

    fn propagate(&mut self, _node: &Node, child: &Node) {
        let (mass, moment) = self
            .stack
            .last_mut()
            .expect("propagate without an open internal cell");
        *mass += child.mass();
        *moment += child.centre_of_mass() * child.mass();
    }

    fn depart(&mut self, node: &Node) -> bool {
        let (mass, moment) = self
            .stack
            .pop()
            .expect("depart without an open internal cell");
        if (node.mass() - mass).abs() > self.tolerance
            || (node.centre_of_mass() * node.mass() - moment).norm() > self.tolerance
        {
            self.failure = Some(Error::MassMismatch {
                node: node.mass(),
                children: mass,
            });
            return false;
        }
        true
    }
}
