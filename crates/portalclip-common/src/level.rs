// level.rs: the collidable models and portals of one loaded level

use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::cmodel::{ClipModelError, CollidableModel, RayCollision};
use crate::portal::{link_portals, linked_partner, Portal};
use crate::shared::{Contents, HullId, ModelId, PortalId, Vec3};

/// Levels with at least this many models trace them on the rayon pool.
pub const PARALLEL_TRACE_THRESHOLD: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("model {model}: {source}")]
    Model {
        model: usize,
        #[source]
        source: ClipModelError,
    },
    #[error("model {0} does not exist")]
    UnknownModel(usize),
    #[error("portal {0} does not exist")]
    UnknownPortal(usize),
    #[error("portal {portal} links to missing portal {partner}")]
    MissingPartner { portal: usize, partner: usize },
    #[error("portal {portal} links to {partner}, which does not link back")]
    OneSidedLink { portal: usize, partner: usize },
}

/// A segment entering a linked portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalHit {
    pub portal: PortalId,
    pub partner: PortalId,
    pub fraction: f32,
    pub point: Vec3,
}

/// Keep the earlier impact; equal fractions go to the lower model id.
fn closer(a: RayCollision, b: RayCollision) -> RayCollision {
    let start_solid = a.start_solid || b.start_solid;
    let mut best = match (a.hit, b.hit) {
        (true, true) => {
            if b.fraction < a.fraction || (b.fraction == a.fraction && b.model < a.model) {
                b
            } else {
                a
            }
        }
        (false, true) => b,
        _ => a,
    };
    best.start_solid = start_solid;
    best
}

#[derive(Debug, Clone, Default)]
pub struct Level {
    pub models: Vec<CollidableModel>,
    pub portals: Vec<Portal>,
}

impl Level {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&mut self, model: CollidableModel) -> ModelId {
        self.models.push(model);
        ModelId(self.models.len() - 1)
    }

    pub fn add_portal(&mut self, portal: Portal) -> PortalId {
        self.portals.push(portal);
        PortalId(self.portals.len() - 1)
    }

    pub fn model(&self, id: ModelId) -> Option<&CollidableModel> {
        self.models.get(id.0)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut CollidableModel> {
        self.models.get_mut(id.0)
    }

    pub fn portal(&self, id: PortalId) -> Option<&Portal> {
        self.portals.get(id.0)
    }

    /// Link two portals both ways, or unlink one side with `None`.
    pub fn link(&mut self, a: Option<PortalId>, b: Option<PortalId>) -> Result<(), LevelError> {
        for id in [a, b].iter().flatten() {
            if id.0 >= self.portals.len() {
                return Err(LevelError::UnknownPortal(id.0));
            }
        }
        link_portals(&mut self.portals, a, b);
        Ok(())
    }

    /// Move a model. Call before stepping colliders in the same frame.
    pub fn set_model_origin(&mut self, id: ModelId, origin: Vec3) -> Result<(), LevelError> {
        let model = self.model_mut(id).ok_or(LevelError::UnknownModel(id.0))?;
        model.set_origin(origin);
        Ok(())
    }

    // ========================================================
    // Queries
    // ========================================================

    /// Trace against every model and keep the earliest impact.
    pub fn trace(&self, start: &Vec3, end: &Vec3, hull: HullId, epsilon: f32) -> RayCollision {
        let trace_one = |(i, model): (usize, &CollidableModel)| {
            let mut collision = model.trace(start, end, hull, &model.origin, epsilon);
            if collision.hit {
                collision.model = Some(ModelId(i));
            }
            collision
        };

        if self.models.len() >= PARALLEL_TRACE_THRESHOLD {
            self.models
                .par_iter()
                .enumerate()
                .map(trace_one)
                .reduce(|| RayCollision::miss(end), closer)
        } else {
            self.models
                .iter()
                .enumerate()
                .map(trace_one)
                .fold(RayCollision::miss(end), closer)
        }
    }

    /// SOLID if any model holds the point in a solid leaf.
    pub fn point_contents(&self, hull: HullId, point: &Vec3) -> Contents {
        let solid = self
            .models
            .iter()
            .any(|m| m.point_contents(hull, point, &m.origin).is_solid());
        if solid {
            Contents::Solid
        } else {
            Contents::Empty
        }
    }

    /// Nearest mutually linked portal whose front face `start -> end` enters.
    pub fn find_portal_crossing(&self, start: &Vec3, end: &Vec3) -> Option<PortalHit> {
        let mut best: Option<PortalHit> = None;
        for (i, portal) in self.portals.iter().enumerate() {
            let id = PortalId(i);
            let entry = match portal.crossing(start, end) {
                Some(entry) => entry,
                None => continue,
            };
            let partner = match linked_partner(&self.portals, id) {
                Some(partner) => partner,
                None => continue,
            };
            if best.map_or(true, |b| entry.fraction < b.fraction) {
                best = Some(PortalHit {
                    portal: id,
                    partner,
                    fraction: entry.fraction,
                    point: entry.point,
                });
            }
        }
        best
    }

    /// First portal whose bridge volume holds the point.
    pub fn portal_containing(&self, point: &Vec3) -> Option<PortalId> {
        self.portals
            .iter()
            .position(|p| p.contains(point))
            .map(PortalId)
    }

    /// Load-time check of every model tree and portal link.
    pub fn validate(&self) -> Result<(), LevelError> {
        for (i, model) in self.models.iter().enumerate() {
            model
                .validate()
                .map_err(|source| LevelError::Model { model: i, source })?;
        }
        for (i, portal) in self.portals.iter().enumerate() {
            let partner = match portal.linked {
                Some(partner) => partner,
                None => continue,
            };
            let other = self.portals.get(partner.0).ok_or(LevelError::MissingPartner {
                portal: i,
                partner: partner.0,
            })?;
            if other.linked != Some(PortalId(i)) {
                warn!("portal {} links to {} one-sidedly", i, partner.0);
                return Err(LevelError::OneSidedLink {
                    portal: i,
                    partner: partner.0,
                });
            }
        }
        debug!(
            "level ok: {} models, {} portals",
            self.models.len(),
            self.portals.len()
        );
        Ok(())
    }
}

// ============================================================
// Tests
// ============================================================
