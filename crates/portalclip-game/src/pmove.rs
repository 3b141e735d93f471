// pmove.rs: box-collider movement with slide, step-climb, floor-stick and portals
//
// One call advances one collider by one frame. The collider is traced as a
// point against the hull that was built for its size.

use log::{debug, trace};

use portalclip_common::cmodel::RayCollision;
use portalclip_common::cvar::MoveConfig;
use portalclip_common::level::{Level, PortalHit};
use portalclip_common::portal::Portal;
use portalclip_common::shared::{
    dot_product, horizontal_dist_squared, vector_add, vector_compare, vector_length, vector_ma,
    vector_normalize, vector_scale, vector_subtract, HullId, Mat3, ModelId, PortalId, Vec3, DOWN,
    UP, VEC3_ORIGIN, VERTICAL,
};

// ============================================================
// Collider state
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BoxCollider {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Added to the velocity every step.
    pub gravity: Vec3,
    /// Speed lost per step while on a floor.
    pub friction: f32,
    pub max_speed: f32,
    /// 1 slides along a surface, larger values bounce off it.
    pub bounce: f32,
    /// Which hull of each model to trace against.
    pub hull: HullId,
    pub on_ground: bool,
    pub in_portal: Option<PortalId>,
    pub standing_on: Option<ModelId>,
}

impl Default for BoxCollider {
    fn default() -> Self {
        BoxCollider {
            position: VEC3_ORIGIN,
            velocity: VEC3_ORIGIN,
            mins: [-16.0, -24.0, -16.0],
            maxs: [16.0, 32.0, 16.0],
            gravity: vector_scale(&DOWN, 0.8),
            friction: 1.0,
            max_speed: 300.0,
            bounce: 1.0,
            hull: HullId::Small,
            on_ground: false,
            in_portal: None,
            standing_on: None,
        }
    }
}

impl BoxCollider {
    pub fn new(position: Vec3, mins: Vec3, maxs: Vec3) -> Self {
        BoxCollider {
            position,
            mins,
            maxs,
            ..Default::default()
        }
    }

    /// Largest distance from the position to a face of the box.
    pub fn half_extent(&self) -> f32 {
        self.mins
            .iter()
            .chain(self.maxs.iter())
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }
}

/// Sent to the view layer when a collider passes through a portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalCrossing {
    pub entered: PortalId,
    pub exit: PortalId,
    /// Position right after the transfer, next to the exit portal.
    pub position: Vec3,
    pub velocity: Vec3,
    /// Rotation applied to the velocity; views apply it to their angles.
    pub rotation: Mat3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOutcome {
    /// Position changed this step.
    pub moved: bool,
    /// The step-climb result was taken.
    pub stepped: bool,
    /// The move was rejected and the collider held in place.
    pub blocked: bool,
    pub on_ground: bool,
    pub standing_on: Option<ModelId>,
    pub crossing: Option<PortalCrossing>,
}

// ============================================================
// Callbacks trait
// ============================================================

/// The collision queries the movement code needs from the level.
pub trait PmoveCallbacks {
    fn trace(&self, start: &Vec3, end: &Vec3, hull: HullId, epsilon: f32) -> RayCollision;
    fn portal_crossing(&self, start: &Vec3, end: &Vec3) -> Option<PortalHit>;
    fn portal(&self, id: PortalId) -> Option<&Portal>;
    fn portal_containing(&self, point: &Vec3) -> Option<PortalId>;
}

impl PmoveCallbacks for Level {
    fn trace(&self, start: &Vec3, end: &Vec3, hull: HullId, epsilon: f32) -> RayCollision {
        Level::trace(self, start, end, hull, epsilon)
    }

    fn portal_crossing(&self, start: &Vec3, end: &Vec3) -> Option<PortalHit> {
        self.find_portal_crossing(start, end)
    }

    fn portal(&self, id: PortalId) -> Option<&Portal> {
        Level::portal(self, id)
    }

    fn portal_containing(&self, point: &Vec3) -> Option<PortalId> {
        Level::portal_containing(self, point)
    }
}

// ============================================================
// Internal functions
// ============================================================

/// Remove the velocity component along `normal`, scaled by `overbounce`.
pub fn clip_velocity(inv: &Vec3, normal: &Vec3, overbounce: f32) -> Vec3 {
    let backoff = dot_product(inv, normal) * overbounce;
    vector_ma(inv, -backoff, normal)
}

/// Result of one bounded move-and-slide attempt.
#[derive(Debug, Clone, Copy)]
struct MoveAttempt {
    position: Vec3,
    velocity: Vec3,
    success: bool,
    hit_wall: bool,
    crossing: Option<PortalCrossing>,
}

struct PmoveContext<'a, C: PmoveCallbacks> {
    collider: &'a mut BoxCollider,
    cb: &'a C,
    config: &'a MoveConfig,
}

impl<'a, C: PmoveCallbacks> PmoveContext<'a, C> {
    fn trace(&self, start: &Vec3, end: &Vec3) -> RayCollision {
        self.cb
            .trace(start, end, self.collider.hull, self.config.clip_epsilon)
    }

    // --------------------------------------------------------
    // Portals
    // --------------------------------------------------------

    /// A blocking hit at `blocked` may really be the surface of a linked
    /// portal. Look along the path, stretched by the box size, for a portal
    /// face reached no later than the blocking hit.
    fn try_portal(&self, start: &Vec3, end: &Vec3, blocked: &Vec3, velocity: &Vec3) -> Option<PortalCrossing> {
        let mut dir = vector_subtract(end, start);
        let len = vector_normalize(&mut dir);
        if len == 0.0 {
            return None;
        }
        let extent = self.collider.half_extent();
        let stretched = vector_ma(end, extent, &dir);
        let hit = self.cb.portal_crossing(start, &stretched)?;

        let reach = hit.fraction * (len + extent);
        let blocked_at = vector_length(&vector_subtract(blocked, start));
        if reach > blocked_at + extent {
            return None;
        }

        let portal = self.cb.portal(hit.portal)?;
        let partner = self.cb.portal(hit.partner)?;
        let position = portal.transform_point_to_other_side(partner, &hit.point);
        let velocity = portal.transform_vector_to_other_side(velocity);
        debug!(
            "portal {} -> {}: {:?} to {:?}",
            hit.portal.0, hit.partner.0, hit.point, position
        );
        Some(PortalCrossing {
            entered: hit.portal,
            exit: hit.partner,
            position,
            velocity,
            rotation: portal.rotation_to_other_side(),
        })
    }

    // --------------------------------------------------------
    // Slide move
    // --------------------------------------------------------

    fn slide_move(&self, start: &Vec3, velocity: &Vec3) -> MoveAttempt {
        let mut pos = *start;
        let mut vel = *velocity;
        let mut end = vector_add(&pos, &vel);
        let mut hit_wall = false;
        let mut crossing = None;

        for _bump in 0..self.config.max_iterations {
            let tr = self.trace(&pos, &end);
            if !tr.hit {
                return MoveAttempt {
                    position: end,
                    velocity: vel,
                    success: true,
                    hit_wall,
                    crossing,
                };
            }

            if self.config.portals {
                if let Some(c) = self.try_portal(&pos, &end, &tr.point, &vel) {
                    pos = c.position;
                    vel = c.velocity;
                    end = vector_add(&pos, &vel);
                    crossing = Some(c);
                    continue;
                }
            }

            if tr.plane.is_wall() {
                hit_wall = true;
            }
            vel = clip_velocity(&vel, &tr.plane.normal, self.collider.bounce);
            pos = tr.point;
            end = vector_add(&pos, &vel);
        }

        MoveAttempt {
            position: pos,
            velocity: vel,
            success: false,
            hit_wall,
            crossing,
        }
    }

    // --------------------------------------------------------
    // Step climb
    // --------------------------------------------------------

    /// Retry the move from one step height up, then push back down. Only a
    /// landing on a floor counts.
    fn step_climb(&self, start: &Vec3, velocity: &Vec3) -> Option<MoveAttempt> {
        let step = self.config.step_height;
        let raised = vector_ma(start, step, &UP);
        if self.trace(start, &raised).hit {
            return None; // no headroom
        }

        let up = self.slide_move(&raised, velocity);
        if !up.success {
            return None;
        }

        let down = vector_ma(&up.position, step, &DOWN);
        let tr = self.trace(&up.position, &down);
        if !tr.hit || !tr.plane.is_floor(self.config.floor_normal) {
            return None;
        }

        Some(MoveAttempt {
            position: tr.point,
            ..up
        })
    }

    // --------------------------------------------------------
    // Floor stick and friction
    // --------------------------------------------------------

    fn floor_stick(&mut self) {
        // rising movers are not pulled back
        if self.collider.velocity[VERTICAL] < 0.0 {
            return;
        }
        let pos = self.collider.position;
        let probe = vector_ma(&pos, self.config.floor_probe, &DOWN);
        let tr = self.trace(&pos, &probe);
        if !tr.hit || !tr.plane.is_floor(self.config.floor_normal) {
            return;
        }
        self.collider.position = tr.point;
        self.collider.velocity = clip_velocity(&self.collider.velocity, &tr.plane.normal, 1.0);
        self.collider.on_ground = true;
        self.collider.standing_on = tr.model;
    }

    fn friction(&mut self) {
        let vel = self.collider.velocity;
        let speed = vector_length(&vel);
        if speed == 0.0 {
            return;
        }
        let newspeed = (speed - self.collider.friction)
            .min(self.collider.max_speed)
            .max(0.0);
        self.collider.velocity = vector_scale(&vel, newspeed / speed);
    }

    // --------------------------------------------------------
    // Step
    // --------------------------------------------------------

    fn execute(&mut self) -> StepOutcome {
        self.collider.on_ground = false;
        self.collider.in_portal = None;
        self.collider.standing_on = None;

        self.collider.velocity = vector_add(&self.collider.velocity, &self.collider.gravity);

        let start_o = self.collider.position;
        let start_v = self.collider.velocity;

        let plain = self.slide_move(&start_o, &start_v);
        let mut stepped = false;

        let accepted = if plain.hit_wall {
            match self.step_climb(&start_o, &start_v) {
                Some(up)
                    if !plain.success
                        || horizontal_dist_squared(&start_o, &up.position)
                            > horizontal_dist_squared(&start_o, &plain.position) =>
                {
                    stepped = true;
                    Some(up)
                }
                _ if plain.success => Some(plain),
                _ => None,
            }
        } else if plain.success {
            Some(plain)
        } else {
            None
        };

        let mut outcome = StepOutcome {
            stepped,
            ..Default::default()
        };

        match accepted {
            Some(attempt) => {
                self.collider.position = attempt.position;
                self.collider.velocity = attempt.velocity;
                outcome.crossing = attempt.crossing;
                self.floor_stick();
                if self.collider.on_ground {
                    self.friction();
                }
            }
            None => {
                trace!("move blocked at {:?}", start_o);
                self.collider.position = start_o;
                self.collider.velocity = VEC3_ORIGIN;
                outcome.blocked = true;
            }
        }

        self.collider.in_portal = self.cb.portal_containing(&self.collider.position);

        outcome.moved = !vector_compare(&self.collider.position, &start_o);
        outcome.on_ground = self.collider.on_ground;
        outcome.standing_on = self.collider.standing_on;
        trace!(
            "step: {:?} -> {:?} stepped={} ground={}",
            start_o,
            self.collider.position,
            outcome.stepped,
            outcome.on_ground
        );
        outcome
    }
}

/// Advance one collider by one frame against the level.
pub fn step_collider<C: PmoveCallbacks>(collider: &mut BoxCollider, callbacks: &C, config: &MoveConfig) -> StepOutcome {
    let mut ctx = PmoveContext {
        collider,
        cb: callbacks,
        config,
    };
    ctx.execute()
}

// ============================================================
// Unit tests
// ============================================================
