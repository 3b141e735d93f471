// hullbuild.rs: extruded clip hulls over flat convex polygons
//
// A polygon lying in the (right, up) plane of an orientation basis is bounded
// by four edge planes and pushed out along forward between two depths. The
// six inward-facing planes are chained so that only points in front of all of
// them are EMPTY.

use thiserror::Error;

use crate::cmodel::{ClipChild, ClipNode, CollidableModel};
use crate::shared::{
    add_point_to_bounds, dot_product, mat3_axis, vector_length, vector_ma, vector_negate,
    vector_scale, Contents, Mat3, Plane, Vec3, MAX_HULLS,
};

const AXIS_RIGHT: usize = 0;
const AXIS_UP: usize = 1;
const AXIS_FORWARD: usize = 2;

/// Tolerance on basis vector length and orthogonality.
const BASIS_EPSILON: f32 = 1e-3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HullBuildError {
    #[error("polygon has {0} vertices, at least 3 are needed")]
    TooFewVertices(usize),
    #[error("back depth {back} is not behind front depth {front}")]
    InvertedDepths { front: f32, back: f32 },
    #[error("orientation is not an orthonormal basis")]
    DegenerateOrientation,
}

/// Average of the polygon's vertices.
pub fn polygon_centroid(polygon: &[Vec3]) -> Vec3 {
    let mut sum = [0.0f32; 3];
    for v in polygon {
        for i in 0..3 {
            sum[i] += v[i];
        }
    }
    if polygon.is_empty() {
        return sum;
    }
    vector_scale(&sum, 1.0 / polygon.len() as f32)
}

pub fn is_orthonormal(orientation: &Mat3) -> bool {
    let axes = [
        mat3_axis(orientation, AXIS_RIGHT),
        mat3_axis(orientation, AXIS_UP),
        mat3_axis(orientation, AXIS_FORWARD),
    ];
    for axis in axes.iter() {
        if (vector_length(axis) - 1.0).abs() > BASIS_EPSILON {
            return false;
        }
    }
    for i in 0..3 {
        for j in (i + 1)..3 {
            if dot_product(&axes[i], &axes[j]).abs() > BASIS_EPSILON {
                return false;
            }
        }
    }
    true
}

/// Vertex with the largest projection onto `axis`.
fn support_vertex<'a>(polygon: &'a [Vec3], axis: &Vec3) -> &'a Vec3 {
    let mut best = &polygon[0];
    let mut best_d = dot_product(best, axis);
    for v in polygon.iter().skip(1) {
        let d = dot_product(v, axis);
        if d > best_d {
            best = v;
            best_d = d;
        }
    }
    best
}

/// The six inward-facing bounding planes: four edges, then front, then back.
pub fn hull_planes(
    polygon: &[Vec3],
    orientation: &Mat3,
    front_depth: f32,
    back_depth: f32,
) -> Vec<Plane> {
    let right = mat3_axis(orientation, AXIS_RIGHT);
    let up = mat3_axis(orientation, AXIS_UP);
    let forward = mat3_axis(orientation, AXIS_FORWARD);
    let center = polygon_centroid(polygon);

    let mut planes = Vec::with_capacity(6);
    for axis in [right, vector_negate(&right), up, vector_negate(&up)].iter() {
        let v = support_vertex(polygon, axis);
        planes.push(Plane::new(vector_negate(axis), dot_product(axis, v)));
    }

    let center_d = dot_product(&forward, &center);
    planes.push(Plane::new(vector_negate(&forward), center_d + front_depth));
    planes.push(Plane::new(forward, -(center_d + back_depth)));
    planes
}

/// Build the clip hull for a flat convex polygon extruded along the
/// orientation's forward axis from `back_depth` to `front_depth`.
pub fn build_hull(
    polygon: &[Vec3],
    orientation: &Mat3,
    front_depth: f32,
    back_depth: f32,
) -> Result<CollidableModel, HullBuildError> {
    if polygon.len() < 3 {
        return Err(HullBuildError::TooFewVertices(polygon.len()));
    }
    if back_depth >= front_depth {
        return Err(HullBuildError::InvertedDepths {
            front: front_depth,
            back: back_depth,
        });
    }
    if !is_orthonormal(orientation) {
        return Err(HullBuildError::DegenerateOrientation);
    }

    let planes = hull_planes(polygon, orientation, front_depth, back_depth);

    let count = planes.len();
    let nodes: Vec<ClipNode> = (0..count)
        .map(|i| ClipNode {
            plane: i,
            children: [
                if i + 1 < count {
                    ClipChild::Node(i + 1)
                } else {
                    ClipChild::Leaf(Contents::Empty)
                },
                ClipChild::Leaf(Contents::Solid),
            ],
        })
        .collect();

    let forward = mat3_axis(orientation, AXIS_FORWARD);
    let mut mins = [f32::MAX; 3];
    let mut maxs = [f32::MIN; 3];
    for v in polygon {
        add_point_to_bounds(&vector_ma(v, front_depth, &forward), &mut mins, &mut maxs);
        add_point_to_bounds(&vector_ma(v, back_depth, &forward), &mut mins, &mut maxs);
    }

    Ok(CollidableModel::new(
        mins,
        maxs,
        planes,
        nodes,
        [Some(ClipChild::Node(0)); MAX_HULLS],
    ))
}

// ============================================================
// Tests
// ============================================================
