// shared.rs: vector math, planes, leaf contents and ids shared by every module

// ============================================================
// Vector types
// ============================================================

pub type Vec3 = [f32; 3];

/// Row-major 3x3 matrix. Orientation bases store their axes as columns.
pub type Mat3 = [[f32; 3]; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

/// The world is Y-down: "up" points along -Y.
pub const VERTICAL: usize = 1;
pub const UP: Vec3 = [0.0, -1.0, 0.0];
pub const DOWN: Vec3 = [0.0, 1.0, 0.0];

pub const MAT3_IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Half turn about the local up (Y) axis. Two linked portal faces look at
/// each other, so leaving one means entering the other backwards.
pub const ROTATE_180_Y: Mat3 = [[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, -1.0]];

// ============================================================
// MATHLIB: vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

/// veca + scale * vecb
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

pub fn vector_compare(v1: &Vec3, v2: &Vec3) -> bool {
    v1[0] == v2[0] && v1[1] == v2[1] && v1[2] == v2[2]
}

/// Point at fraction `t` of the way from `a` to `b`.
#[inline]
pub fn lerp_point(a: &Vec3, b: &Vec3, t: f32) -> Vec3 {
    [
        a[0] + t * (b[0] - a[0]),
        a[1] + t * (b[1] - a[1]),
        a[2] + t * (b[2] - a[2]),
    ]
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Squared length of the movement perpendicular to the vertical axis.
pub fn horizontal_dist_squared(from: &Vec3, to: &Vec3) -> f32 {
    let dx = to[0] - from[0];
    let dz = to[2] - from[2];
    dx * dx + dz * dz
}

// ============================================================
// Matrix operations
// ============================================================

pub fn mat3_mul(in1: &Mat3, in2: &Mat3) -> Mat3 {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = in1[i][0] * in2[0][j] + in1[i][1] * in2[1][j] + in1[i][2] * in2[2][j];
        }
    }
    out
}

pub fn mat3_transpose(m: &Mat3) -> Mat3 {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

pub fn mat3_mul_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    [dot_product(&m[0], v), dot_product(&m[1], v), dot_product(&m[2], v)]
}

/// Build an orientation whose columns are the right, up and forward axes.
pub fn mat3_from_basis(right: &Vec3, up: &Vec3, forward: &Vec3) -> Mat3 {
    [
        [right[0], up[0], forward[0]],
        [right[1], up[1], forward[1]],
        [right[2], up[2], forward[2]],
    ]
}

/// Column `axis` of an orientation (0 = right, 1 = up, 2 = forward).
pub fn mat3_axis(m: &Mat3, axis: usize) -> Vec3 {
    [m[0][axis], m[1][axis], m[2][axis]]
}

// ============================================================
// Plane
// ============================================================

/// Half-space boundary. Points with `distance > 0` are in front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: [0.0; 3],
            dist: 0.0,
        }
    }
}

impl Plane {
    pub const fn new(normal: Vec3, dist: f32) -> Self {
        Self { normal, dist }
    }

    /// Plane through `point` facing along `normal`.
    pub fn from_point_normal(point: &Vec3, normal: &Vec3) -> Self {
        Self {
            normal: *normal,
            dist: -dot_product(normal, point),
        }
    }

    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        dot_product(&self.normal, p) + self.dist
    }

    pub fn flipped(&self) -> Self {
        Self {
            normal: vector_negate(&self.normal),
            dist: -self.dist,
        }
    }

    /// Vertical walls have no vertical normal component at all.
    pub fn is_wall(&self) -> bool {
        self.normal[VERTICAL] == 0.0
    }

    /// Upward-facing surfaces steep enough to stand on. Up is -Y, so the
    /// vertical component has to be below `-threshold`.
    pub fn is_floor(&self, threshold: f32) -> bool {
        self.normal[VERTICAL] < -threshold
    }
}

// ============================================================
// Leaf contents
// ============================================================

/// Sentinel the level loader writes into a child slot for an empty leaf.
pub const CONTENTS_EMPTY: i32 = -1;
/// Sentinel the level loader writes into a child slot for a solid leaf.
pub const CONTENTS_SOLID: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Contents {
    #[default]
    Empty,
    Solid,
}

impl Contents {
    /// Decode a negative child sentinel. Unknown values yield `None`.
    pub fn from_sentinel(raw: i32) -> Option<Self> {
        match raw {
            CONTENTS_EMPTY => Some(Contents::Empty),
            CONTENTS_SOLID => Some(Contents::Solid),
            _ => None,
        }
    }

    pub fn sentinel(self) -> i32 {
        match self {
            Contents::Empty => CONTENTS_EMPTY,
            Contents::Solid => CONTENTS_SOLID,
        }
    }

    #[inline]
    pub fn is_solid(self) -> bool {
        self == Contents::Solid
    }
}

// ============================================================
// Ids
// ============================================================

pub const MAX_HULLS: usize = 3;

/// Which of a model's hull roots to walk. Each root is built for a mover size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HullId {
    /// Zero-size hull for point and ray queries.
    #[default]
    Point = 0,
    Small = 1,
    Large = 2,
}

impl HullId {
    pub const ALL: [HullId; MAX_HULLS] = [HullId::Point, HullId::Small, HullId::Large];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Index of a model inside its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub usize);

/// Index of a portal inside its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortalId(pub usize);

slotmap::new_key_type! {
    /// Handle of a box collider owned by the frame world.
    pub struct ColliderId;
}

// ============================================================
// Tests
// ============================================================
