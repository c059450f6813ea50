pub mod logging;

use std::sync::OnceLock;

static DEBUG_MODE: OnceLock<bool> = OnceLock::new();

/// `NEB_DEBUG=1` (or `true`) turns on per-tick debug output and shorter intervals.
pub fn debug_enabled() -> bool {
    *DEBUG_MODE.get_or_init(|| {
        std::env::var("NEB_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
