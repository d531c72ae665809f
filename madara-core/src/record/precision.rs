//! Process-wide double-to-string precision and format mode.
//!
//! State machine: initial precision is 6 digits, `fixed = false`
//! (scientific-capable default), mirroring `Knowledge_Record::set_precision`
//! / `get_precision` in the original MADARA sources. Guarded by a
//! `parking_lot::Mutex` rather than a bare `AtomicU32` pair because `fixed`
//! and `precision` should be observed together by formatting code.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct PrecisionState {
    precision: i64,
    fixed: bool,
}

static STATE: Lazy<Mutex<PrecisionState>> = Lazy::new(|| {
    Mutex::new(PrecisionState {
        precision: 6,
        fixed: false,
    })
});

/// Sets the global precision, returning the new value.
pub fn set_precision(new_precision: i64) -> i64 {
    let mut state = STATE.lock();
    state.precision = new_precision;
    state.precision
}

/// Returns the current global precision without modifying it.
pub fn get_precision() -> i64 {
    STATE.lock().precision
}

pub fn set_fixed() {
    STATE.lock().fixed = true;
}

pub fn set_scientific() {
    STATE.lock().fixed = false;
}

pub fn is_fixed() -> bool {
    STATE.lock().fixed
}

/// Formats a double using the current global precision/mode state.
pub fn format_double(value: f64) -> String {
    let state = *STATE.lock();
    if state.precision < 0 {
        // negative precision means "full/shortest" representation
        return format!("{}", value);
    }
    let p = state.precision as usize;
    if state.fixed {
        format!("{:.*}", p, value)
    } else {
        // Rust has no native %g; emulate by trimming trailing zeros of a
        // fixed-precision render, which matches the common case of small
        // fractional values without pulling in a formatting crate.
        let rendered = format!("{:.*}", p, value);
        if rendered.contains('.') {
            let trimmed = rendered.trim_end_matches('0');
            let trimmed = trimmed.trim_end_matches('.');
            if trimmed.is_empty() || trimmed == "-" {
                "0".to_string()
            } else {
                trimmed.to_string()
            }
        } else {
            rendered
        }
    }
}

/// Test helper: restores global state to library defaults. Tests that
/// mutate precision/format must call this in their teardown. Not gated on
/// `cfg(test)` so integration tests in `tests/` (a separate crate) can use
/// it too.
pub fn reset_for_test() {
    let mut state = STATE.lock();
    state.precision = 6;
    state.fixed = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_precision_returns_new_value() {
        reset_for_test();
        let returned = set_precision(2);
        assert_eq!(returned, 2);
        assert_eq!(get_precision(), 2);
        reset_for_test();
    }

    #[test]
    fn fixed_mode_keeps_trailing_zeros() {
        reset_for_test();
        set_precision(2);
        set_fixed();
        assert_eq!(format_double(1.5), "1.50");
        reset_for_test();
    }

    #[test]
    fn scientific_mode_trims_trailing_zeros() {
        reset_for_test();
        set_precision(4);
        set_scientific();
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(2.0), "2");
        reset_for_test();
    }
}
