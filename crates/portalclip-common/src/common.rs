// common.rs: process-wide setup shared by tools and tests

use log::LevelFilter;

/// Install the `env_logger` backend. `RUST_LOG` overrides the default
/// `info` level. Later calls are no-ops, so every test may call it.
pub fn log_init() {
    let _ = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .is_test(cfg!(test))
        .try_init();
}
