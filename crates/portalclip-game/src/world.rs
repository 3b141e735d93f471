// world.rs: owns the colliders of a level and steps them once per frame
//
// Platforms move first (translate_model), then run_frame steps every collider
// in slot order. Colliders standing on a model are recorded in that model's
// rider set so the platform can carry them.

use log::debug;
use slotmap::SlotMap;

use portalclip_common::cvar::{CvarContext, MoveConfig};
use portalclip_common::level::{Level, LevelError};
use portalclip_common::shared::{vector_add, ColliderId, ModelId, Vec3};

use crate::pmove::{step_collider, BoxCollider, PortalCrossing, StepOutcome};

#[derive(Debug, Default)]
pub struct World {
    pub level: Level,
    pub colliders: SlotMap<ColliderId, BoxCollider>,
    pub config: MoveConfig,
}

impl World {
    pub fn new(level: Level, config: MoveConfig) -> Self {
        World {
            level,
            colliders: SlotMap::with_key(),
            config,
        }
    }

    pub fn spawn_collider(&mut self, collider: BoxCollider) -> ColliderId {
        let standing_on = collider.standing_on;
        let id = self.colliders.insert(collider);
        if let Some(model) = standing_on.and_then(|m| self.level.model_mut(m)) {
            model.add_rider(id);
        }
        id
    }

    pub fn remove_collider(&mut self, id: ColliderId) -> Option<BoxCollider> {
        self.detach(id);
        self.colliders.remove(id)
    }

    pub fn collider(&self, id: ColliderId) -> Option<&BoxCollider> {
        self.colliders.get(id)
    }

    pub fn collider_mut(&mut self, id: ColliderId) -> Option<&mut BoxCollider> {
        self.colliders.get_mut(id)
    }

    /// Drop `id` from the rider set of the model it stands on.
    fn detach(&mut self, id: ColliderId) {
        let standing_on = self.colliders.get(id).and_then(|c| c.standing_on);
        if let Some(model) = standing_on.and_then(|m| self.level.model_mut(m)) {
            model.remove_rider(id);
        }
    }

    /// Advance one collider. Returns None for an unknown id.
    pub fn step(&mut self, id: ColliderId) -> Option<StepOutcome> {
        self.detach(id);
        let collider = self.colliders.get_mut(id)?;
        let outcome = step_collider(collider, &self.level, &self.config);
        if let Some(model) = outcome.standing_on.and_then(|m| self.level.model_mut(m)) {
            model.add_rider(id);
        }
        Some(outcome)
    }

    /// Step every collider once and collect the portal crossings.
    pub fn run_frame(&mut self) -> Vec<(ColliderId, PortalCrossing)> {
        let ids: Vec<ColliderId> = self.colliders.keys().collect();
        let mut crossings = Vec::new();
        for id in ids {
            if let Some(crossing) = self.step(id).and_then(|out| out.crossing) {
                crossings.push((id, crossing));
            }
        }
        crossings
    }

    /// Apply latched cvar changes between frames and reload the movement
    /// tuning when any `pm_` cvar changed. Returns true on reload.
    pub fn apply_cvars(&mut self, ctx: &mut CvarContext) -> bool {
        ctx.get_latched_vars();
        let changed = ctx.take_modified();
        if !changed.iter().any(|name| name.starts_with("pm_")) {
            return false;
        }
        self.config = MoveConfig::from_cvars(ctx);
        debug!("movement config reloaded ({}): {:?}", changed.join(", "), self.config);
        true
    }

    /// Move a model and everything standing on it.
    pub fn translate_model(&mut self, model: ModelId, delta: &Vec3) -> Result<(), LevelError> {
        let m = self
            .level
            .model_mut(model)
            .ok_or(LevelError::UnknownModel(model.0))?;
        m.translate(delta);

        let riders: Vec<ColliderId> = m.riders().iter().copied().collect();
        for id in riders.iter() {
            if let Some(c) = self.colliders.get_mut(*id) {
                c.position = vector_add(&c.position, delta);
            }
        }
        debug!("model {} moved by {:?} with {} riders", model.0, delta, riders.len());
        Ok(())
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use portalclip_common::cmodel::CollidableModel;
    use portalclip_common::cvar::{CvarFlags, CVAR_PM_MAXITERATIONS, CVAR_PM_STEPSIZE};
    use portalclip_common::portal::Portal;
    use portalclip_common::shared::{mat3_from_basis, HullId, VEC3_ORIGIN};

    fn resting_collider(position: Vec3) -> BoxCollider {
        BoxCollider {
            position,
            gravity: [0.0, 1.0, 0.0],
            friction: 0.0,
            hull: HullId::Point,
            ..Default::default()
        }
    }

    /// Platform block whose top face is at y = 0.
    fn platform_world() -> (World, ModelId) {
        let mut level = Level::new();
        let lift = level.add_model(CollidableModel::for_bounds(
            [-50.0, 0.0, -50.0],
            [50.0, 10.0, 50.0],
        ));
        (World::new(level, MoveConfig::default()), lift)
    }

    #[test]
    fn test_step_records_rider() {
        let (mut world, lift) = platform_world();
        let id = world.spawn_collider(resting_collider(VEC3_ORIGIN));

        let out = world.step(id).unwrap();
        assert!(out.on_ground);
        assert_eq!(out.standing_on, Some(lift));
        assert!(world.level.model(lift).unwrap().riders().contains(&id));
    }

    #[test]
    fn test_elevator_carries_riders() {
        let (mut world, lift) = platform_world();
        let rider = world.spawn_collider(resting_collider(VEC3_ORIGIN));
        let bystander = world.spawn_collider(resting_collider([200.0, -40.0, 0.0]));
        world.run_frame();

        world.translate_model(lift, &[0.0, -5.0, 0.0]).unwrap();
        assert_abs_diff_eq!(world.collider(rider).unwrap().position[1], -5.0);
        // not on the lift: untouched by it
        assert_abs_diff_eq!(world.collider(bystander).unwrap().position[1], -39.0);

        world.run_frame();
        let c = world.collider(rider).unwrap();
        assert!(c.on_ground);
        assert_abs_diff_eq!(c.position[1], -5.0, epsilon = 1e-4);
        assert!(world.level.model(lift).unwrap().riders().contains(&rider));
    }

    #[test]
    fn test_leaving_platform_drops_rider() {
        let (mut world, lift) = platform_world();
        let id = world.spawn_collider(resting_collider(VEC3_ORIGIN));
        world.run_frame();
        assert_eq!(world.level.model(lift).unwrap().riders().len(), 1);

        let c = world.collider_mut(id).unwrap();
        c.gravity = VEC3_ORIGIN;
        c.velocity = [0.0, -20.0, 0.0];
        world.run_frame();
        assert!(world.level.model(lift).unwrap().riders().is_empty());
        assert!(!world.collider(id).unwrap().on_ground);
    }

    #[test]
    fn test_remove_collider_detaches() {
        let (mut world, lift) = platform_world();
        let id = world.spawn_collider(resting_collider(VEC3_ORIGIN));
        world.run_frame();

        assert!(world.remove_collider(id).is_some());
        assert!(world.level.model(lift).unwrap().riders().is_empty());
        assert!(world.collider(id).is_none());
        assert!(world.step(id).is_none());
        assert!(world.remove_collider(id).is_none());
    }

    #[test]
    fn test_apply_cvars_takes_latched_iterations() {
        let (mut world, _) = platform_world();
        let mut ctx = CvarContext::new();
        MoveConfig::register(&mut ctx);
        assert!(world.apply_cvars(&mut ctx));
        assert!(!world.apply_cvars(&mut ctx));

        ctx.set(CVAR_PM_MAXITERATIONS, "2");
        ctx.set(CVAR_PM_STEPSIZE, "10");
        assert!(world.apply_cvars(&mut ctx));
        assert_eq!(world.config.max_iterations, 2);
        assert_eq!(world.config.step_height, 10.0);
        assert_eq!(ctx.variable_value(CVAR_PM_MAXITERATIONS), 2.0);
    }

    #[test]
    fn test_apply_cvars_ignores_unrelated_changes() {
        let (mut world, _) = platform_world();
        let mut ctx = CvarContext::new();
        MoveConfig::register(&mut ctx);
        world.apply_cvars(&mut ctx);

        world.config.step_height = 7.0;
        ctx.get("sv_gravity", "800", CvarFlags::empty());
        assert!(!world.apply_cvars(&mut ctx));
        assert_eq!(world.config.step_height, 7.0);
    }

    #[test]
    fn test_translate_unknown_model() {
        let (mut world, _) = platform_world();
        assert_eq!(
            world.translate_model(ModelId(9), &[1.0, 0.0, 0.0]),
            Err(LevelError::UnknownModel(9))
        );
    }

    #[test]
    fn test_run_frame_reports_crossings() {
        let mut level = Level::new();
        // slab around portal A only, so B's side is open
        level.add_model(CollidableModel::for_bounds([-10.0, -10.0, 10.0], [10.0, 10.0, 20.0]));
        let a_basis = mat3_from_basis(&[1.0, 0.0, 0.0], &[0.0, -1.0, 0.0], &[0.0, 0.0, -1.0]);
        let b_basis = mat3_from_basis(&[-1.0, 0.0, 0.0], &[0.0, -1.0, 0.0], &[0.0, 0.0, 1.0]);
        let a = level.add_portal(
            Portal::with_default_depths(
                vec![[-4.0, -4.0, 10.0], [4.0, -4.0, 10.0], [4.0, 4.0, 10.0], [-4.0, 4.0, 10.0]],
                a_basis,
            )
            .unwrap(),
        );
        let b = level.add_portal(
            Portal::with_default_depths(
                vec![[46.0, -4.0, 0.0], [54.0, -4.0, 0.0], [54.0, 4.0, 0.0], [46.0, 4.0, 0.0]],
                b_basis,
            )
            .unwrap(),
        );
        level.link(Some(a), Some(b)).unwrap();

        let mut world = World::new(level, MoveConfig::default());
        let mover = world.spawn_collider(BoxCollider {
            velocity: [0.0, 0.0, 20.0],
            gravity: VEC3_ORIGIN,
            mins: [-1.0; 3],
            maxs: [1.0; 3],
            hull: HullId::Point,
            ..Default::default()
        });
        let idle = world.spawn_collider(BoxCollider {
            position: [-30.0, 0.0, 0.0],
            gravity: VEC3_ORIGIN,
            hull: HullId::Point,
            ..Default::default()
        });

        let crossings = world.run_frame();
        assert_eq!(crossings.len(), 1);
        let (id, crossing) = crossings[0];
        assert_eq!(id, mover);
        assert_ne!(id, idle);
        assert_eq!(crossing.entered, a);
        assert_eq!(crossing.exit, b);
        // B faces +z, so the mover keeps heading along +z from B's center
        assert_abs_diff_eq!(crossing.position[0], 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(crossing.velocity[2], 20.0, epsilon = 1e-3);
        let c = world.collider(mover).unwrap();
        assert_abs_diff_eq!(c.position[2], 20.0, epsilon = 1e-3);
    }
}
