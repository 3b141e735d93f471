// portal.rs: linked portal surfaces and the transforms between them
//
// A portal is a flat convex polygon with an orientation basis whose forward
// axis is the surface normal. Two linked portals share a transform that maps
// anything leaving one face into the frame of the other. The faces look at
// each other, so the mapping includes a half turn about the local up axis.

use log::{debug, warn};

use crate::cmodel::CollidableModel;
use crate::hullbuild::{build_hull, polygon_centroid, HullBuildError};
use crate::shared::{
    dot_product, lerp_point, mat3_axis, mat3_mul, mat3_mul_vec, mat3_transpose, vector_add,
    vector_subtract, Contents, HullId, Mat3, Plane, PortalId, Vec3, MAT3_IDENTITY, ROTATE_180_Y,
};

/// Default extrusion of the bridge volume in front of the surface.
pub const PORTAL_FRONT_DEPTH: f32 = 16.0;
/// Default extrusion behind the surface.
pub const PORTAL_BACK_DEPTH: f32 = -4.0;

/// Where a segment passes through a portal face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalEntry {
    pub fraction: f32,
    pub point: Vec3,
}

#[derive(Debug, Clone)]
pub struct Portal {
    pub polygon: Vec<Vec3>,
    pub center: Vec3,
    /// Faces along the orientation's forward axis.
    pub plane: Plane,
    /// Columns are right, up and forward.
    pub orientation: Mat3,
    /// Bound rectangle of the polygon in (right, up) coordinates around the
    /// center: `[right_min, up_min]` and `[right_max, up_max]`.
    pub rect_mins: [f32; 2],
    pub rect_maxs: [f32; 2],
    pub bridge: CollidableModel,
    /// `orientation * ROTATE_180_Y * partner.orientationᵀ`, identity when
    /// unlinked.
    pub transform_to_other_side: Mat3,
    pub linked: Option<PortalId>,
}

impl Portal {
    pub fn new(
        polygon: Vec<Vec3>,
        orientation: Mat3,
        front_depth: f32,
        back_depth: f32,
    ) -> Result<Self, HullBuildError> {
        let bridge = build_hull(&polygon, &orientation, front_depth, back_depth)?;
        let center = polygon_centroid(&polygon);
        let forward = mat3_axis(&orientation, 2);
        let plane = Plane::from_point_normal(&center, &forward);

        let right = mat3_axis(&orientation, 0);
        let up = mat3_axis(&orientation, 1);
        let mut rect_mins = [f32::MAX; 2];
        let mut rect_maxs = [f32::MIN; 2];
        for v in polygon.iter() {
            let rel = vector_subtract(v, &center);
            let proj = [dot_product(&rel, &right), dot_product(&rel, &up)];
            for i in 0..2 {
                rect_mins[i] = rect_mins[i].min(proj[i]);
                rect_maxs[i] = rect_maxs[i].max(proj[i]);
            }
        }

        Ok(Portal {
            polygon,
            center,
            plane,
            orientation,
            rect_mins,
            rect_maxs,
            bridge,
            transform_to_other_side: MAT3_IDENTITY,
            linked: None,
        })
    }

    /// Portal with the default bridge depths.
    pub fn with_default_depths(polygon: Vec<Vec3>, orientation: Mat3) -> Result<Self, HullBuildError> {
        Portal::new(polygon, orientation, PORTAL_FRONT_DEPTH, PORTAL_BACK_DEPTH)
    }

    pub fn forward(&self) -> Vec3 {
        mat3_axis(&self.orientation, 2)
    }

    /// Whether a point on the portal plane projects inside the bound
    /// rectangle.
    pub fn rect_contains(&self, point: &Vec3) -> bool {
        let rel = vector_subtract(point, &self.center);
        let r = dot_product(&rel, &mat3_axis(&self.orientation, 0));
        let u = dot_product(&rel, &mat3_axis(&self.orientation, 1));
        r >= self.rect_mins[0] && r <= self.rect_maxs[0] && u >= self.rect_mins[1] && u <= self.rect_maxs[1]
    }

    /// Where `start -> end` enters the front face inside the bound rectangle.
    pub fn crossing(&self, start: &Vec3, end: &Vec3) -> Option<PortalEntry> {
        let ds = self.plane.distance(start);
        let de = self.plane.distance(end);
        if ds < 0.0 || de >= 0.0 {
            return None;
        }
        let fraction = ds / (ds - de);
        let point = lerp_point(start, end, fraction);
        if !self.rect_contains(&point) {
            return None;
        }
        Some(PortalEntry { fraction, point })
    }

    /// Inside the bridge volume.
    pub fn contains(&self, point: &Vec3) -> bool {
        self.bridge.point_contents(HullId::Point, point, &self.bridge.origin) == Contents::Empty
    }

    /// The matrix applied to vectors leaving through this portal.
    pub fn rotation_to_other_side(&self) -> Mat3 {
        mat3_transpose(&self.transform_to_other_side)
    }

    pub fn transform_vector_to_other_side(&self, v: &Vec3) -> Vec3 {
        mat3_mul_vec(&self.rotation_to_other_side(), v)
    }

    /// Map a world point near this portal to the matching point near
    /// `partner`.
    pub fn transform_point_to_other_side(&self, partner: &Portal, point: &Vec3) -> Vec3 {
        let rel = vector_subtract(point, &self.center);
        vector_add(&partner.center, &self.transform_vector_to_other_side(&rel))
    }

    fn unlink(&mut self) {
        self.linked = None;
        self.transform_to_other_side = MAT3_IDENTITY;
    }
}

fn portal_transform(from: &Mat3, to: &Mat3) -> Mat3 {
    mat3_mul(&mat3_mul(from, &ROTATE_180_Y), &mat3_transpose(to))
}

/// Drop whatever `id` is linked to, and the partner's link back.
fn detach(portals: &mut [Portal], id: PortalId) {
    if let Some(old) = portals[id.0].linked {
        if old != id && portals[old.0].linked == Some(id) {
            portals[old.0].unlink();
        }
        portals[id.0].unlink();
        debug!("portal {} unlinked from {}", id.0, old.0);
    }
}

/// Link `a` and `b` both ways. Passing `None` for one side unlinks the other
/// side from its previous partner. Ids must index `portals`.
pub fn link_portals(portals: &mut [Portal], a: Option<PortalId>, b: Option<PortalId>) {
    match (a, b) {
        (Some(a), Some(b)) => {
            if portals[a.0].linked != Some(b) {
                detach(portals, a);
            }
            if portals[b.0].linked != Some(a) {
                detach(portals, b);
            }

            let ta = portal_transform(&portals[a.0].orientation, &portals[b.0].orientation);
            let tb = portal_transform(&portals[b.0].orientation, &portals[a.0].orientation);
            portals[a.0].linked = Some(b);
            portals[a.0].transform_to_other_side = ta;
            portals[b.0].linked = Some(a);
            portals[b.0].transform_to_other_side = tb;
            debug!("portal {} linked to {}", a.0, b.0);
        }
        (Some(id), None) | (None, Some(id)) => detach(portals, id),
        (None, None) => {}
    }
}

/// The partner of `id`, only when the link points back.
pub fn linked_partner(portals: &[Portal], id: PortalId) -> Option<PortalId> {
    let partner = portals.get(id.0)?.linked?;
    match portals.get(partner.0) {
        Some(other) if other.linked == Some(id) => Some(partner),
        _ => {
            warn!("portal {} has a one-sided link to {}", id.0, partner.0);
            None
        }
    }
}

// ============================================================
// Tests
// ============================================================
