#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::collapsible_else_if, clippy::manual_range_contains, clippy::float_cmp,
         clippy::needless_range_loop, clippy::new_without_default)]

pub mod shared;
pub mod common;
pub mod cvar;
pub mod bsptrace;
pub mod cmodel;
pub mod hullbuild;
pub mod portal;
pub mod level;
