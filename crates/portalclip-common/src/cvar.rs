// cvar.rs: console variables and the movement tuning read from them

use std::collections::HashMap;

use bitflags::bitflags;
use log::{debug, info};
use parking_lot::{const_mutex, Mutex};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CvarFlags: u32 {
        /// Saved with the configuration.
        const ARCHIVE = 1;
        /// Ignored by `set`.
        const NOSET = 8;
        /// Changes wait for `get_latched_vars`.
        const LATCH = 16;
    }
}

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// The full cvar system context.
#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Float value of a cvar, 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// String value of a cvar, "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    /// Get or create a cvar. An existing cvar keeps its value but gains
    /// `flags`.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    /// Set a cvar (respects NOSET and LATCH).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };

        let var = &mut self.cvar_vars[idx];
        if var.flags.contains(CvarFlags::NOSET) {
            info!("{} is write protected.", name);
            return idx;
        }
        if var.flags.contains(CvarFlags::LATCH) {
            let pending = var.latched_string.as_deref().unwrap_or(var.string.as_str());
            if value != pending {
                info!("{} will be changed on the next level.", name);
                var.latched_string = Some(value.to_string());
            }
            return idx;
        }

        if value == var.string {
            return idx;
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        debug!("cvar {} = \"{}\"", name, value);
        idx
    }

    pub fn set_value(&mut self, name: &str, value: f32) {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str);
    }

    /// Apply every pending latched change.
    pub fn get_latched_vars(&mut self) {
        for var in self.cvar_vars.iter_mut() {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Names of modified cvars; clears their modified flags.
    pub fn take_modified(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        for var in self.cvar_vars.iter_mut() {
            if var.modified {
                var.modified = false;
                names.push(var.name.clone());
            }
        }
        names
    }
}

// ============================================================
// Global singleton and free-function wrappers
// ============================================================

static CVAR_CTX: Mutex<Option<CvarContext>> = const_mutex(None);

pub fn cvar_init() {
    *CVAR_CTX.lock() = Some(CvarContext::new());
}

/// Access the global context with a closure. Returns None if not initialized.
pub fn with_cvar_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut CvarContext) -> R,
{
    CVAR_CTX.lock().as_mut().map(f)
}

pub fn cvar_set(name: &str, value: &str) {
    with_cvar_ctx(|c| c.set(name, value));
}

pub fn cvar_variable_value(name: &str) -> f32 {
    CVAR_CTX.lock().as_ref().map_or(0.0, |c| c.variable_value(name))
}

// ============================================================
// Movement tuning
// ============================================================

pub const CVAR_PM_CLIPEPSILON: &str = "pm_clipepsilon";
pub const CVAR_PM_STEPSIZE: &str = "pm_stepsize";
pub const CVAR_PM_FLOORPROBE: &str = "pm_floorprobe";
pub const CVAR_PM_MAXITERATIONS: &str = "pm_maxiterations";
pub const CVAR_PM_FLOORNORMAL: &str = "pm_floornormal";
pub const CVAR_PM_PORTALS: &str = "pm_portals";

/// Tunables of the tracer and the movement engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveConfig {
    /// Split-point bias in the tracer.
    pub clip_epsilon: f32,
    pub step_height: f32,
    /// Length of the downward floor-stick probe.
    pub floor_probe: f32,
    /// Impacts allowed per move attempt.
    pub max_iterations: usize,
    /// A floor normal's vertical component must be below `-floor_normal`.
    pub floor_normal: f32,
    pub portals: bool,
}

impl Default for MoveConfig {
    fn default() -> Self {
        MoveConfig {
            clip_epsilon: 0.03125,
            step_height: 18.0,
            floor_probe: 3.0,
            max_iterations: 4,
            floor_normal: 0.7,
            portals: true,
        }
    }
}

impl MoveConfig {
    /// Create the movement cvars with their default values. Existing cvars
    /// keep what they hold.
    pub fn register(ctx: &mut CvarContext) {
        let d = MoveConfig::default();
        ctx.get(CVAR_PM_CLIPEPSILON, &d.clip_epsilon.to_string(), CvarFlags::ARCHIVE);
        ctx.get(CVAR_PM_STEPSIZE, &d.step_height.to_string(), CvarFlags::ARCHIVE);
        ctx.get(CVAR_PM_FLOORPROBE, &d.floor_probe.to_string(), CvarFlags::ARCHIVE);
        ctx.get(CVAR_PM_MAXITERATIONS, &d.max_iterations.to_string(), CvarFlags::LATCH);
        ctx.get(CVAR_PM_FLOORNORMAL, &d.floor_normal.to_string(), CvarFlags::ARCHIVE);
        ctx.get(CVAR_PM_PORTALS, "1", CvarFlags::ARCHIVE);
    }

    /// Read the movement cvars. Missing or non-positive values fall back to
    /// the defaults. At least one iteration is always allowed.
    pub fn from_cvars(ctx: &CvarContext) -> Self {
        let d = MoveConfig::default();
        let positive = |name: &str, fallback: f32| match ctx.find_var(name) {
            Some(var) if var.value > 0.0 => var.value,
            _ => fallback,
        };
        MoveConfig {
            clip_epsilon: positive(CVAR_PM_CLIPEPSILON, d.clip_epsilon),
            step_height: positive(CVAR_PM_STEPSIZE, d.step_height),
            floor_probe: positive(CVAR_PM_FLOORPROBE, d.floor_probe),
            max_iterations: positive(CVAR_PM_MAXITERATIONS, d.max_iterations as f32).max(1.0)
                as usize,
            floor_normal: positive(CVAR_PM_FLOORNORMAL, d.floor_normal),
            portals: ctx
                .find_var(CVAR_PM_PORTALS)
                .map_or(d.portals, |var| var.value != 0.0),
        }
    }

    /// Read from the global context, or the defaults when it is not up.
    pub fn from_global() -> Self {
        with_cvar_ctx(|c| MoveConfig::from_cvars(c)).unwrap_or_default()
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvar_get_and_find() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "42", CvarFlags::empty());
        assert_eq!(ctx.variable_value("test_var"), 42.0);
        assert_eq!(ctx.variable_string("test_var"), "42");
    }

    #[test]
    fn test_cvar_get_creates_once() {
        let mut ctx = CvarContext::new();
        ctx.get("test", "1", CvarFlags::empty());
        ctx.get("test", "2", CvarFlags::ARCHIVE);
        assert_eq!(ctx.variable_string("test"), "1");
        assert!(ctx.find_var("test").unwrap().flags.contains(CvarFlags::ARCHIVE));
    }

    #[test]
    fn test_cvar_noset() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "10", CvarFlags::NOSET);
        ctx.set("test_var", "20");
        assert_eq!(ctx.variable_value("test_var"), 10.0);
        ctx.get_latched_vars();
        assert_eq!(ctx.variable_value("test_var"), 10.0);
    }

    #[test]
    fn test_cvar_latch() {
        let mut ctx = CvarContext::new();
        ctx.get(CVAR_PM_MAXITERATIONS, "4", CvarFlags::LATCH);
        ctx.set(CVAR_PM_MAXITERATIONS, "8");
        assert_eq!(ctx.variable_value(CVAR_PM_MAXITERATIONS), 4.0);
        ctx.get_latched_vars();
        assert_eq!(ctx.variable_value(CVAR_PM_MAXITERATIONS), 8.0);
    }

    #[test]
    fn test_cvar_set_value_and_modified() {
        let mut ctx = CvarContext::new();
        ctx.get("a", "0", CvarFlags::empty());
        ctx.get("b", "0", CvarFlags::empty());
        ctx.take_modified();
        ctx.set_value("a", 2.0);
        assert_eq!(ctx.variable_string("a"), "2");
        ctx.set_value("b", 0.5);
        assert_eq!(ctx.variable_string("b"), "0.5");
        assert_eq!(ctx.take_modified(), vec!["a".to_string(), "b".to_string()]);
        assert!(ctx.take_modified().is_empty());
    }

    #[test]
    fn test_cvar_not_found() {
        let ctx = CvarContext::new();
        assert_eq!(ctx.variable_value("nonexistent"), 0.0);
        assert_eq!(ctx.variable_string("nonexistent"), "");
    }

    #[test]
    fn test_move_config_defaults_round_trip_through_cvars() {
        let mut ctx = CvarContext::new();
        MoveConfig::register(&mut ctx);
        assert_eq!(MoveConfig::from_cvars(&ctx), MoveConfig::default());
        assert_eq!(ctx.variable_value(CVAR_PM_CLIPEPSILON), 0.03125);
        assert_eq!(ctx.variable_value(CVAR_PM_STEPSIZE), 18.0);
    }

    #[test]
    fn test_move_config_reads_overrides() {
        let mut ctx = CvarContext::new();
        MoveConfig::register(&mut ctx);
        ctx.set(CVAR_PM_STEPSIZE, "24");
        ctx.set(CVAR_PM_PORTALS, "0");
        ctx.set(CVAR_PM_FLOORPROBE, "-1");
        let config = MoveConfig::from_cvars(&ctx);
        assert_eq!(config.step_height, 24.0);
        assert!(!config.portals);
        assert_eq!(config.floor_probe, 3.0);
    }

    #[test]
    fn test_move_config_fractional_iterations() {
        let mut ctx = CvarContext::new();
        ctx.get(CVAR_PM_MAXITERATIONS, "0.5", CvarFlags::empty());
        assert_eq!(MoveConfig::from_cvars(&ctx).max_iterations, 1);
        ctx.set(CVAR_PM_MAXITERATIONS, "2.7");
        assert_eq!(MoveConfig::from_cvars(&ctx).max_iterations, 2);
    }

    #[test]
    fn test_global_context() {
        cvar_init();
        with_cvar_ctx(MoveConfig::register);
        cvar_set(CVAR_PM_STEPSIZE, "12");
        assert_eq!(cvar_variable_value(CVAR_PM_STEPSIZE), 12.0);
        assert_eq!(MoveConfig::from_global().step_height, 12.0);
    }
}
