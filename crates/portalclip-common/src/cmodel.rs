// cmodel.rs: collidable models and their clip hulls
//
// A collidable model owns up to MAX_HULLS clip trees sharing one plane and
// node pool. Trees are stored in model-local space; the model origin moves
// them in the world without touching the planes.

use std::collections::HashSet;

use log::debug;
use thiserror::Error;

use crate::bsptrace::{classify_point, trace_tree, BspNode, BspTree};
use crate::shared::{
    dot_product, vector_add, vector_subtract, ColliderId, Contents, HullId, ModelId, Plane, Vec3, MAX_HULLS,
    VEC3_ORIGIN,
};

/// Deepest chain of split nodes accepted from level data.
pub const MAX_TREE_DEPTH: usize = 32;

// ============================================================
// Clip tree storage
// ============================================================

/// A clip-node child: another node, or an inline leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipChild {
    Node(usize),
    Leaf(Contents),
}

impl ClipChild {
    /// Decode a level-file child index: non-negative is a node, negative is a
    /// contents sentinel. Unknown sentinels decode to `None`.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw >= 0 {
            Some(ClipChild::Node(raw as usize))
        } else {
            Contents::from_sentinel(raw).map(ClipChild::Leaf)
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            ClipChild::Node(n) => n as i32,
            ClipChild::Leaf(contents) => contents.sentinel(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipNode {
    pub plane: usize,
    /// `[front, back]`
    pub children: [ClipChild; 2],
}

/// A clip node as read from level data, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawClipNode {
    pub plane: i32,
    pub children: [i32; 2],
}

/// Borrowed view of one model's plane and node pool.
#[derive(Debug, Clone, Copy)]
pub struct HullTree<'a> {
    pub planes: &'a [Plane],
    pub nodes: &'a [ClipNode],
}

impl<'a> HullTree<'a> {
    pub fn new(planes: &'a [Plane], nodes: &'a [ClipNode]) -> Self {
        HullTree { planes, nodes }
    }
}

impl<'a> BspTree for HullTree<'a> {
    type Ref = ClipChild;

    fn node(&self, r: ClipChild) -> BspNode<'_, ClipChild> {
        match r {
            ClipChild::Leaf(contents) => BspNode::Leaf(contents),
            ClipChild::Node(n) => {
                let node = &self.nodes[n];
                BspNode::Split {
                    plane: &self.planes[node.plane],
                    children: node.children,
                }
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipModelError {
    #[error("clip node {node} references plane {plane}, model has {count} planes")]
    BadPlane { node: usize, plane: i32, count: usize },
    #[error("clip node {node} references child node {child}, model has {count} nodes")]
    BadNode { node: usize, child: usize, count: usize },
    #[error("clip node {node} has unknown leaf sentinel {raw}")]
    BadSentinel { node: usize, raw: i32 },
    #[error("hull {hull} root {raw} is neither a node nor a known leaf")]
    BadRoot { hull: usize, raw: i32 },
    #[error("model has {count} hull roots, at most {limit} are supported")]
    TooManyHulls { count: usize, limit: usize },
    #[error("clip node {node} is reachable from itself")]
    Cycle { node: usize },
    #[error("hull {hull} is deeper than {limit} nodes")]
    TooDeep { hull: usize, limit: usize },
}

// ============================================================
// Ray collision result
// ============================================================

/// Outcome of tracing a segment against a model or the whole level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCollision {
    pub hit: bool,
    /// Fraction of the segment travelled before the impact, 1 on a miss.
    pub fraction: f32,
    /// World-space end of travel: the impact point, or the segment end.
    pub point: Vec3,
    /// Impact plane in world space, facing the side the segment came from.
    pub plane: Plane,
    pub model: Option<ModelId>,
    pub start_solid: bool,
}

impl RayCollision {
    pub fn miss(end: &Vec3) -> Self {
        RayCollision {
            hit: false,
            fraction: 1.0,
            point: *end,
            plane: Plane::default(),
            model: None,
            start_solid: false,
        }
    }
}

impl Default for RayCollision {
    fn default() -> Self {
        RayCollision::miss(&VEC3_ORIGIN)
    }
}

// ============================================================
// Collidable model
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct CollidableModel {
    /// Local-space bounds of the model.
    pub mins: Vec3,
    pub maxs: Vec3,
    pub planes: Vec<Plane>,
    pub nodes: Vec<ClipNode>,
    /// Root of each hull; `None` means the hull is absent and everything in
    /// it is empty.
    pub hulls: [Option<ClipChild>; MAX_HULLS],
    pub origin: Vec3,
    riders: HashSet<ColliderId>,
}

impl CollidableModel {
    /// Assemble a model from already-decoded parts. Callers guarantee the
    /// indices are in range; use `from_raw` for untrusted data.
    pub fn new(
        mins: Vec3,
        maxs: Vec3,
        planes: Vec<Plane>,
        nodes: Vec<ClipNode>,
        hulls: [Option<ClipChild>; MAX_HULLS],
    ) -> Self {
        CollidableModel {
            mins,
            maxs,
            planes,
            nodes,
            hulls,
            origin: VEC3_ORIGIN,
            riders: HashSet::new(),
        }
    }

    /// Decode and validate level data.
    pub fn from_raw(
        mins: Vec3,
        maxs: Vec3,
        planes: Vec<Plane>,
        raw_nodes: &[RawClipNode],
        hull_roots: &[i32],
    ) -> Result<Self, ClipModelError> {
        if hull_roots.len() > MAX_HULLS {
            return Err(ClipModelError::TooManyHulls {
                count: hull_roots.len(),
                limit: MAX_HULLS,
            });
        }

        let mut nodes = Vec::with_capacity(raw_nodes.len());
        for (i, raw) in raw_nodes.iter().enumerate() {
            if raw.plane < 0 || raw.plane as usize >= planes.len() {
                return Err(ClipModelError::BadPlane {
                    node: i,
                    plane: raw.plane,
                    count: planes.len(),
                });
            }
            let mut children = [ClipChild::Leaf(Contents::Empty); 2];
            for (side, &child) in raw.children.iter().enumerate() {
                children[side] = ClipChild::from_raw(child)
                    .ok_or(ClipModelError::BadSentinel { node: i, raw: child })?;
            }
            nodes.push(ClipNode {
                plane: raw.plane as usize,
                children,
            });
        }

        let mut hulls = [None; MAX_HULLS];
        for (h, &raw) in hull_roots.iter().enumerate() {
            let root = ClipChild::from_raw(raw).ok_or(ClipModelError::BadRoot { hull: h, raw })?;
            if let ClipChild::Node(n) = root {
                if n >= nodes.len() {
                    return Err(ClipModelError::BadRoot { hull: h, raw });
                }
            }
            hulls[h] = Some(root);
        }

        let model = CollidableModel::new(mins, maxs, planes, nodes, hulls);
        model.validate()?;
        debug!(
            "loaded clip model: {} planes, {} nodes, {} hulls",
            model.planes.len(),
            model.nodes.len(),
            hull_roots.len()
        );
        Ok(model)
    }

    /// Check that every index resolves and each hull is a finite, acyclic
    /// tree no deeper than `MAX_TREE_DEPTH`.
    pub fn validate(&self) -> Result<(), ClipModelError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.plane >= self.planes.len() {
                return Err(ClipModelError::BadPlane {
                    node: i,
                    plane: node.plane as i32,
                    count: self.planes.len(),
                });
            }
            for child in node.children.iter() {
                if let ClipChild::Node(c) = *child {
                    if c >= self.nodes.len() {
                        return Err(ClipModelError::BadNode {
                            node: i,
                            child: c,
                            count: self.nodes.len(),
                        });
                    }
                }
            }
        }

        let mut on_path = vec![false; self.nodes.len()];
        for (h, root) in self.hulls.iter().enumerate() {
            match root {
                Some(ClipChild::Node(n)) => {
                    if *n >= self.nodes.len() {
                        return Err(ClipModelError::BadRoot {
                            hull: h,
                            raw: *n as i32,
                        });
                    }
                    self.check_subtree(h, *n, 1, &mut on_path)?;
                }
                Some(ClipChild::Leaf(_)) | None => {}
            }
        }
        Ok(())
    }

    fn check_subtree(
        &self,
        hull: usize,
        n: usize,
        depth: usize,
        on_path: &mut [bool],
    ) -> Result<(), ClipModelError> {
        if on_path[n] {
            return Err(ClipModelError::Cycle { node: n });
        }
        if depth > MAX_TREE_DEPTH {
            return Err(ClipModelError::TooDeep {
                hull,
                limit: MAX_TREE_DEPTH,
            });
        }
        on_path[n] = true;
        for child in self.nodes[n].children.iter() {
            if let ClipChild::Node(c) = *child {
                self.check_subtree(hull, c, depth + 1, on_path)?;
            }
        }
        on_path[n] = false;
        Ok(())
    }

    // ========================================================
    // Canned shapes
    // ========================================================

    /// Convex solid bounded by outward-facing planes: a point is solid when
    /// it is behind every plane. Each node sends its front to EMPTY and its
    /// back to the next plane, the last back to SOLID.
    pub fn convex_solid(planes: Vec<Plane>) -> Self {
        let count = planes.len();
        let nodes: Vec<ClipNode> = (0..count)
            .map(|i| ClipNode {
                plane: i,
                children: [
                    ClipChild::Leaf(Contents::Empty),
                    if i + 1 < count {
                        ClipChild::Node(i + 1)
                    } else {
                        ClipChild::Leaf(Contents::Solid)
                    },
                ],
            })
            .collect();
        let root = if count == 0 {
            ClipChild::Leaf(Contents::Empty)
        } else {
            ClipChild::Node(0)
        };
        CollidableModel::new(VEC3_ORIGIN, VEC3_ORIGIN, planes, nodes, [Some(root); MAX_HULLS])
    }

    /// Axis-aligned solid box.
    pub fn for_bounds(mins: Vec3, maxs: Vec3) -> Self {
        let mut planes = Vec::with_capacity(6);
        for axis in 0..3 {
            let mut normal = VEC3_ORIGIN;
            normal[axis] = 1.0;
            planes.push(Plane::new(normal, -maxs[axis]));
            normal[axis] = -1.0;
            planes.push(Plane::new(normal, mins[axis]));
        }
        let mut model = CollidableModel::convex_solid(planes);
        model.mins = mins;
        model.maxs = maxs;
        model
    }

    /// Everything behind `plane` is solid.
    pub fn half_space(plane: Plane) -> Self {
        CollidableModel::convex_solid(vec![plane])
    }

    // ========================================================
    // Queries
    // ========================================================

    pub fn hull_root(&self, hull: HullId) -> Option<ClipChild> {
        self.hulls[hull.index()]
    }

    pub fn hull_tree(&self) -> HullTree<'_> {
        HullTree::new(&self.planes, &self.nodes)
    }

    /// Contents of the hull at a world-space point, with the model placed at
    /// `origin`.
    pub fn point_contents(&self, hull: HullId, point: &Vec3, origin: &Vec3) -> Contents {
        match self.hull_root(hull) {
            Some(root) => {
                let local = vector_subtract(point, origin);
                classify_point(&self.hull_tree(), root, &local)
            }
            None => Contents::Empty,
        }
    }

    /// Trace a world-space segment against one hull with the model placed at
    /// `origin`. The returned collision carries no model id.
    pub fn trace(
        &self,
        start: &Vec3,
        end: &Vec3,
        hull: HullId,
        origin: &Vec3,
        epsilon: f32,
    ) -> RayCollision {
        let root = match self.hull_root(hull) {
            Some(root) => root,
            None => return RayCollision::miss(end),
        };

        let local_start = vector_subtract(start, origin);
        let local_end = vector_subtract(end, origin);
        let outcome = trace_tree(&self.hull_tree(), root, &local_start, &local_end, epsilon);

        match outcome.hit {
            Some(hit) => {
                let point = vector_add(&hit.point, origin);
                // shift the plane with the model
                let dist = hit.plane.dist - dot_product(&hit.plane.normal, origin);
                RayCollision {
                    hit: true,
                    fraction: hit.fraction,
                    point,
                    plane: Plane::new(hit.plane.normal, dist),
                    model: None,
                    start_solid: outcome.start_solid,
                }
            }
            None => RayCollision {
                start_solid: outcome.start_solid,
                ..RayCollision::miss(end)
            },
        }
    }

    // ========================================================
    // Placement and riders
    // ========================================================

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    pub fn translate(&mut self, delta: &Vec3) {
        self.origin = vector_add(&self.origin, delta);
    }

    /// Colliders currently standing on this model.
    pub fn riders(&self) -> &HashSet<ColliderId> {
        &self.riders
    }

    pub fn add_rider(&mut self, id: ColliderId) -> bool {
        self.riders.insert(id)
    }

    pub fn remove_rider(&mut self, id: ColliderId) -> bool {
        self.riders.remove(&id)
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsptrace::DIST_EPSILON;
    use crate::shared::{CONTENTS_EMPTY, CONTENTS_SOLID};
    use approx::assert_abs_diff_eq;
    use slotmap::SlotMap;

    fn wall_raw() -> (Vec<Plane>, Vec<RawClipNode>) {
        (
            vec![Plane::new([-1.0, 0.0, 0.0], 5.0)],
            vec![RawClipNode {
                plane: 0,
                children: [CONTENTS_EMPTY, CONTENTS_SOLID],
            }],
        )
    }

    #[test]
    fn test_child_decoding() {
        assert_eq!(ClipChild::from_raw(3), Some(ClipChild::Node(3)));
        assert_eq!(ClipChild::from_raw(-1), Some(ClipChild::Leaf(Contents::Empty)));
        assert_eq!(ClipChild::from_raw(-2), Some(ClipChild::Leaf(Contents::Solid)));
        assert_eq!(ClipChild::from_raw(-7), None);
        assert_eq!(ClipChild::Leaf(Contents::Solid).raw(), -2);
        assert_eq!(ClipChild::Node(4).raw(), 4);
    }

    #[test]
    fn test_from_raw_decodes() {
        let (planes, raw) = wall_raw();
        let model = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0, 0, 0]).unwrap();
        assert_eq!(model.nodes.len(), 1);
        assert_eq!(
            model.nodes[0].children,
            [ClipChild::Leaf(Contents::Empty), ClipChild::Leaf(Contents::Solid)]
        );
        assert_eq!(model.hull_root(HullId::Large), Some(ClipChild::Node(0)));
    }

    #[test]
    fn test_from_raw_missing_hulls_are_empty() {
        let (planes, raw) = wall_raw();
        let model = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0]).unwrap();
        assert_eq!(model.hull_root(HullId::Small), None);
        assert_eq!(
            model.point_contents(HullId::Small, &[10.0, 0.0, 0.0], &VEC3_ORIGIN),
            Contents::Empty
        );
        let hit = model.trace(&[0.0; 3], &[10.0, 0.0, 0.0], HullId::Small, &VEC3_ORIGIN, DIST_EPSILON);
        assert!(!hit.hit);
        assert_eq!(hit.fraction, 1.0);
        assert_eq!(hit.point, [10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_raw_rejects_bad_plane() {
        let (planes, mut raw) = wall_raw();
        raw[0].plane = 4;
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0]).unwrap_err();
        assert_eq!(err, ClipModelError::BadPlane { node: 0, plane: 4, count: 1 });
    }

    #[test]
    fn test_from_raw_rejects_bad_child() {
        let (planes, mut raw) = wall_raw();
        raw[0].children[0] = 9;
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0]).unwrap_err();
        assert_eq!(err, ClipModelError::BadNode { node: 0, child: 9, count: 1 });
    }

    #[test]
    fn test_from_raw_rejects_unknown_sentinel() {
        let (planes, mut raw) = wall_raw();
        raw[0].children[1] = -5;
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0]).unwrap_err();
        assert_eq!(err, ClipModelError::BadSentinel { node: 0, raw: -5 });
    }

    #[test]
    fn test_from_raw_rejects_bad_root() {
        let (planes, raw) = wall_raw();
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes.clone(), &raw, &[2]).unwrap_err();
        assert_eq!(err, ClipModelError::BadRoot { hull: 0, raw: 2 });
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, ClipModelError::TooManyHulls { count: 4, limit: MAX_HULLS });
    }

    #[test]
    fn test_from_raw_rejects_cycle() {
        let planes = vec![Plane::new([1.0, 0.0, 0.0], 0.0)];
        let raw = vec![
            RawClipNode { plane: 0, children: [1, CONTENTS_SOLID] },
            RawClipNode { plane: 0, children: [CONTENTS_EMPTY, 0] },
        ];
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &raw, &[0]).unwrap_err();
        assert_eq!(err, ClipModelError::Cycle { node: 0 });
    }

    #[test]
    fn test_from_raw_rejects_deep_tree() {
        let planes = vec![Plane::new([1.0, 0.0, 0.0], 0.0)];
        let count = MAX_TREE_DEPTH as i32 + 1;
        let raw: Vec<RawClipNode> = (0..count)
            .map(|i| RawClipNode {
                plane: 0,
                children: [if i + 1 < count { i + 1 } else { CONTENTS_EMPTY }, CONTENTS_SOLID],
            })
            .collect();
        let err = CollidableModel::from_raw([0.0; 3], [0.0; 3], planes.clone(), &raw, &[0]).unwrap_err();
        assert_eq!(err, ClipModelError::TooDeep { hull: 0, limit: MAX_TREE_DEPTH });

        // exactly at the limit is fine
        let ok = &raw[1..];
        let ok: Vec<RawClipNode> = ok
            .iter()
            .map(|n| RawClipNode {
                plane: n.plane,
                children: [if n.children[0] >= 0 { n.children[0] - 1 } else { n.children[0] }, n.children[1]],
            })
            .collect();
        assert!(CollidableModel::from_raw([0.0; 3], [0.0; 3], planes, &ok, &[0]).is_ok());
    }

    #[test]
    fn test_point_contents_follows_origin() {
        let mut door = CollidableModel::for_bounds([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
        assert_eq!(door.point_contents(HullId::Point, &[0.0; 3], &door.origin), Contents::Solid);

        door.translate(&[10.0, 0.0, 0.0]);
        assert_eq!(door.point_contents(HullId::Point, &[0.0; 3], &door.origin), Contents::Empty);
        assert_eq!(
            door.point_contents(HullId::Point, &[10.5, 0.0, 0.0], &door.origin),
            Contents::Solid
        );
        door.set_origin(VEC3_ORIGIN);
        assert_eq!(door.origin, VEC3_ORIGIN);
    }

    #[test]
    fn test_trace_reports_world_space_hit() {
        let mut wall = CollidableModel::half_space(Plane::new([-1.0, 0.0, 0.0], 5.0));
        wall.set_origin([3.0, 0.0, 0.0]);

        // local wall at x = 5, moved to x = 8
        let hit = wall.trace(&[0.0; 3], &[20.0, 0.0, 0.0], HullId::Point, &wall.origin, DIST_EPSILON);
        assert!(hit.hit);
        assert!(hit.model.is_none());
        assert_abs_diff_eq!(hit.point[0], 8.0 - DIST_EPSILON, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.plane.distance(&[8.0, 0.0, 0.0]), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.fraction, (8.0 - DIST_EPSILON) / 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_box_faces() {
        let block = CollidableModel::for_bounds([0.0, 0.0, 0.0], [2.0, 2.0, 2.0]);
        assert_eq!(block.planes.len(), 6);
        assert_eq!(block.nodes.len(), 6);
        assert_eq!(block.nodes[5].children[1], ClipChild::Leaf(Contents::Solid));

        let hit = block.trace(&[1.0, -10.0, 1.0], &[1.0, 10.0, 1.0], HullId::Point, &VEC3_ORIGIN, DIST_EPSILON);
        assert!(hit.hit);
        assert_eq!(hit.plane.normal, [0.0, -1.0, 0.0]);
        assert_abs_diff_eq!(hit.point[1], -DIST_EPSILON, epsilon = 1e-5);
    }

    #[test]
    fn test_riders() {
        let mut ids: SlotMap<ColliderId, ()> = SlotMap::with_key();
        let a = ids.insert(());
        let b = ids.insert(());

        let mut lift = CollidableModel::default();
        assert!(lift.add_rider(a));
        assert!(!lift.add_rider(a));
        assert!(lift.add_rider(b));
        assert_eq!(lift.riders().len(), 2);
        assert!(lift.remove_rider(a));
        assert!(!lift.remove_rider(a));
        assert!(lift.riders().contains(&b));
    }
}
