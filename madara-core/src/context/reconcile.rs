//! Lamport-clock / quality reconciliation for incoming updates (spec §4.2).

use crate::record::Record;

/// Decides whether an incoming update `update` for some key should replace
/// the current local value `local` (or a virtual-empty record if the key
/// does not yet exist).
///
/// Accept iff:
///  1. `update.quality >= local.quality` (a strictly lower-authority write
///     never overwrites, regardless of clock)
///  2. `update.clock > local.clock`, OR `update.clock == local.clock` AND
///     `update.quality > local.quality`, OR both clock and quality are
///     equal AND `(update.toi, update.originator)` lexicographically
///     follows `(local.toi, local.originator)`.
pub fn should_accept(local: &Record, update: &Record, always_overwrite: bool) -> bool {
    if always_overwrite {
        return true;
    }
    if update.quality < local.quality {
        return false;
    }
    match update.clock.cmp(&local.clock) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match update.quality.cmp(&local.quality) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => {
                (update.toi, &update.originator) > (local.toi, &local.originator)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn record(clock: u64, quality: u32, toi: u64, originator: &str) -> Record {
        let mut r = Record::integer(0);
        r.clock = clock;
        r.quality = quality;
        r.toi = toi;
        r.originator = originator.to_string();
        r
    }

    #[test]
    fn higher_clock_wins() {
        let local = record(3, 1, 0, "a");
        let update = record(4, 1, 0, "a");
        assert!(should_accept(&local, &update, false));
    }

    #[test]
    fn lower_quality_is_rejected_even_with_higher_clock() {
        let local = record(3, 5, 0, "a");
        let update = record(4, 1, 0, "a");
        assert!(!should_accept(&local, &update, false));
    }

    #[test]
    fn equal_clock_and_quality_tie_breaks_by_toi_then_originator() {
        // Covers the toi/originator tie-break path once clock and quality
        // are both equal. The clock=3/quality=1 vs quality=2 scenario from
        // spec scenario 5 is covered separately in `reconciliation_scenario_from_spec`.
        let local = record(3, 2, 10, "agent-a");
        let later = record(3, 2, 20, "agent-a");
        assert!(should_accept(&local, &later, false));
        assert!(!should_accept(&later, &local, false));
    }

    #[test]
    fn reconciliation_scenario_from_spec() {
        let empty = Record::new();
        let u1 = record(3, 1, 5, "a");
        let u2 = record(3, 2, 5, "a");

        // order 1: u1 then u2
        let mut state = empty.clone();
        if should_accept(&state, &u1, false) {
            state = u1.clone();
        }
        if should_accept(&state, &u2, false) {
            state = u2.clone();
        }
        assert_eq!(state.quality, 2);

        // order 2: u2 then u1
        let mut state2 = empty;
        if should_accept(&state2, &u2, false) {
            state2 = u2.clone();
        }
        if should_accept(&state2, &u1, false) {
            state2 = u1;
        }
        assert_eq!(state2.quality, 2);
    }

    #[test]
    fn always_overwrite_bypasses_checks() {
        let local = record(10, 10, 10, "a");
        let update = record(1, 0, 0, "z");
        assert!(should_accept(&local, &update, true));
    }
}
