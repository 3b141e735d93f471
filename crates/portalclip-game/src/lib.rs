#![allow(clippy::needless_return, clippy::too_many_arguments, clippy::collapsible_if,
         clippy::float_cmp, clippy::needless_range_loop)]

pub mod pmove;
pub mod world;
