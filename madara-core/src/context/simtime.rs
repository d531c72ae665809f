//! Simulated playback clock (spec §4.5 `CheckpointSettings::playback_simtime`):
//! when checkpoint replay runs with this flag set, it advances this clock to
//! match each replayed record's recorded `toi` instead of leaving the
//! simulated clock where it was, mirroring the original `MADARA_FEATURE_SIMTIME`
//! playback behavior.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

static SIMTIME: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Advances the simulated clock to `toi`, but never backward.
pub fn advance_to(toi: u64) {
    let mut current = SIMTIME.load(Ordering::Relaxed);
    while toi > current {
        match SIMTIME.compare_exchange_weak(current, toi, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

pub fn now() -> u64 {
    SIMTIME.load(Ordering::Relaxed)
}

/// Test helper: not gated on `cfg(test)` so integration tests in `tests/`
/// (a separate crate) can reset shared global state between runs.
pub fn reset_for_test() {
    SIMTIME.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_to_never_moves_the_clock_backward() {
        reset_for_test();
        advance_to(100);
        assert_eq!(now(), 100);
        advance_to(50);
        assert_eq!(now(), 100);
        advance_to(200);
        assert_eq!(now(), 200);
        reset_for_test();
    }
}
