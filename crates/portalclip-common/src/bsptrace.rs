// bsptrace.rs: segment tracing through any BSP-shaped tree
//
// The same classify-then-split recursion walks the clip hulls and the render
// tree. A tree only has to say, for a reference, whether it is a leaf (and
// with which contents) or a split node (with its plane and two children).

use crate::shared::{lerp_point, Contents, Plane, Vec3};

/// Default bias pushing a split point back toward the side the segment came from.
pub const DIST_EPSILON: f32 = 0.03125;

// ============================================================
// Tree capability set
// ============================================================

/// What a tree reference resolves to.
#[derive(Debug, Clone, Copy)]
pub enum BspNode<'a, R> {
    Leaf(Contents),
    Split { plane: &'a Plane, children: [R; 2] },
}

/// A binary space partition that the tracer can walk. `children[0]` is the
/// front (non-negative distance) side, `children[1]` the back side.
pub trait BspTree {
    type Ref: Copy;

    fn node(&self, r: Self::Ref) -> BspNode<'_, Self::Ref>;

    fn is_leaf(&self, r: Self::Ref) -> bool {
        matches!(self.node(r), BspNode::Leaf(_))
    }

    fn contents_of(&self, r: Self::Ref) -> Option<Contents> {
        match self.node(r) {
            BspNode::Leaf(contents) => Some(contents),
            BspNode::Split { .. } => None,
        }
    }

    fn plane_of(&self, r: Self::Ref) -> Option<&Plane> {
        match self.node(r) {
            BspNode::Leaf(_) => None,
            BspNode::Split { plane, .. } => Some(plane),
        }
    }

    fn children(&self, r: Self::Ref) -> Option<[Self::Ref; 2]> {
        match self.node(r) {
            BspNode::Leaf(_) => None,
            BspNode::Split { children, .. } => Some(children),
        }
    }
}

// ============================================================
// Point classification
// ============================================================

/// Walk from `root` down to the leaf holding `point`.
pub fn classify_point<T: BspTree>(tree: &T, root: T::Ref, point: &Vec3) -> Contents {
    let mut r = root;
    loop {
        match tree.node(r) {
            BspNode::Leaf(contents) => return contents,
            BspNode::Split { plane, children } => {
                r = if plane.distance(point) >= 0.0 {
                    children[0]
                } else {
                    children[1]
                };
            }
        }
    }
}

// ============================================================
// Segment tracing
// ============================================================

/// First impact along a traced segment, in the tree's own frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    /// Fraction of the full segment, in `[0, 1]`.
    pub fraction: f32,
    pub point: Vec3,
    /// Faces the side the segment approached from.
    pub plane: Plane,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TraceOutcome {
    pub hit: Option<TraceHit>,
    /// The segment began inside a solid leaf. Not an impact on its own.
    pub start_solid: bool,
}

struct TraceWalker<'t, T: BspTree> {
    tree: &'t T,
    epsilon: f32,
    start_solid: bool,
}

impl<'t, T: BspTree> TraceWalker<'t, T> {
    fn recursive_trace(
        &mut self,
        r: T::Ref,
        p1f: f32,
        p2f: f32,
        p1: &Vec3,
        p2: &Vec3,
    ) -> Option<TraceHit> {
        let (plane, children) = match self.tree.node(r) {
            BspNode::Leaf(contents) => {
                if contents.is_solid() && p1f == 0.0 {
                    self.start_solid = true;
                }
                return None;
            }
            BspNode::Split { plane, children } => (*plane, children),
        };

        let t1 = plane.distance(p1);
        let t2 = plane.distance(p2);

        if t1 >= 0.0 && t2 >= 0.0 {
            return self.recursive_trace(children[0], p1f, p2f, p1, p2);
        }
        if t1 < 0.0 && t2 < 0.0 {
            return self.recursive_trace(children[1], p1f, p2f, p1, p2);
        }

        // The endpoints straddle the plane, so t1 != t2.
        let (side, frac) = if t1 >= 0.0 {
            (0usize, (t1 - self.epsilon) / (t1 - t2))
        } else {
            (1usize, (t1 + self.epsilon) / (t1 - t2))
        };
        let frac = frac.clamp(0.0, 1.0);

        let midf = p1f + (p2f - p1f) * frac;
        let mid = lerp_point(p1, p2, frac);

        // near side first
        if let Some(hit) = self.recursive_trace(children[side], p1f, midf, p1, &mid) {
            return Some(hit);
        }

        // the split point itself decides whether this plane is the impact
        if classify_point(self.tree, children[side ^ 1], &mid).is_solid() {
            let plane = if side == 0 { plane } else { plane.flipped() };
            return Some(TraceHit {
                fraction: midf,
                point: mid,
                plane,
            });
        }

        self.recursive_trace(children[side ^ 1], midf, p2f, &mid, p2)
    }
}

/// Trace `start -> end` through the tree below `root` and report the closest
/// impact. Zero-length segments never straddle a plane, so they never hit.
pub fn trace_tree<T: BspTree>(
    tree: &T,
    root: T::Ref,
    start: &Vec3,
    end: &Vec3,
    epsilon: f32,
) -> TraceOutcome {
    let mut walker = TraceWalker {
        tree,
        epsilon,
        start_solid: false,
    };
    let hit = walker.recursive_trace(root, 0.0, 1.0, start, end);
    TraceOutcome {
        hit,
        start_solid: walker.start_solid,
    }
}

// ============================================================
// Render tree
// ============================================================

/// Render-tree children point either at nodes or at separate leaf records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderChild {
    Node(usize),
    Leaf(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct RenderNode {
    pub plane: usize,
    pub children: [RenderChild; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderLeaf {
    pub contents: Contents,
}

/// The drawing BSP. Only its partition is used here; face ordering belongs
/// to the renderer. A leaf index with no record reads as empty, so a tree
/// with no nodes and no leaves is open space.
#[derive(Debug, Clone, Default)]
pub struct RenderBsp {
    pub planes: Vec<Plane>,
    pub nodes: Vec<RenderNode>,
    pub leaves: Vec<RenderLeaf>,
}

impl RenderBsp {
    pub fn root(&self) -> RenderChild {
        if self.nodes.is_empty() {
            RenderChild::Leaf(0)
        } else {
            RenderChild::Node(0)
        }
    }

    /// Index of the leaf record holding `point`.
    pub fn leaf_at(&self, point: &Vec3) -> usize {
        let mut r = self.root();
        loop {
            match r {
                RenderChild::Leaf(leaf) => return leaf,
                RenderChild::Node(n) => {
                    let node = &self.nodes[n];
                    r = if self.planes[node.plane].distance(point) >= 0.0 {
                        node.children[0]
                    } else {
                        node.children[1]
                    };
                }
            }
        }
    }
}

impl BspTree for RenderBsp {
    type Ref = RenderChild;

    fn node(&self, r: RenderChild) -> BspNode<'_, RenderChild> {
        match r {
            RenderChild::Leaf(leaf) => BspNode::Leaf(
                self.leaves.get(leaf).map_or(Contents::Empty, |l| l.contents),
            ),
            RenderChild::Node(n) => {
                let node = &self.nodes[n];
                BspNode::Split {
                    plane: &self.planes[node.plane],
                    children: node.children,
                }
            }
        }
    }
}

// ============================================================
// Tests
// ============================================================
