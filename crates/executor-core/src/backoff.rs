use chrono::{DateTime, Utc};
use model::migration::Migration;
use std::time::Duration;

/// Wait between successive cut-over attempts, indexed by the number of
/// attempts already made. The index clamps at the last entry.
const CUTOVER_ATTEMPT_INTERVALS: [Duration; 5] = [
    Duration::ZERO,
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(30 * 60),
];

/// Re-arm offsets after an explicit tick trigger.
pub const TICK_REARM_INTERVALS: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(20),
];

pub fn cutover_attempt_interval(attempts: u64) -> Duration {
    let index = (attempts as usize).min(CUTOVER_ATTEMPT_INTERVALS.len() - 1);
    CUTOVER_ATTEMPT_INTERVALS[index]
}

/// Outcome of the backoff evaluation for a migration that is otherwise ready
/// to cut over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutOverDecision {
    pub should_attempt: bool,
    /// Attempt immediately and KILL blocking queries/connections.
    pub should_force: bool,
}

impl CutOverDecision {
    const HOLD: CutOverDecision = CutOverDecision {
        should_attempt: false,
        should_force: false,
    };
    const FORCE: CutOverDecision = CutOverDecision {
        should_attempt: true,
        should_force: true,
    };
    const ATTEMPT: CutOverDecision = CutOverDecision {
        should_attempt: true,
        should_force: false,
    };
}

/// Decides whether a ready migration should attempt cut-over now.
///
/// Forced when the user requested it, when the migration has been ready to
/// complete for longer than `--force-cut-over-after`, or when that option is
/// effectively zero. Otherwise the attempt counter indexes the backoff table.
pub fn evaluate_cutover_attempt(migration: &Migration, now: DateTime<Utc>) -> CutOverDecision {
    if migration.force_cutover {
        return CutOverDecision::FORCE;
    }
    if let Some(force_after) = migration.force_cut_over_after() {
        if force_after <= Duration::from_millis(1) {
            return CutOverDecision::FORCE;
        }
        if let Some(ready_since) = migration.ready_to_complete_timestamp {
            if let Ok(elapsed) = (now - ready_since).to_std() {
                if elapsed >= force_after {
                    return CutOverDecision::FORCE;
                }
            }
        }
    }
    let desired = cutover_attempt_interval(migration.cutover_attempts);
    let since_last_attempt = match migration.last_cutover_attempt_timestamp {
        Some(last) => (now - last).to_std().unwrap_or(Duration::ZERO),
        None => return CutOverDecision::ATTEMPT,
    };
    if since_last_attempt >= desired {
        CutOverDecision::ATTEMPT
    } else {
        CutOverDecision::HOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use model::status::DdlAction;
    use model::strategy::{DdlStrategy, DdlStrategySetting};
    use model::uuid::OnlineDdlUuid;

    fn migration(options: &str) -> Migration {
        Migration::new_queued(
            OnlineDdlUuid::generate(),
            "commerce",
            "0",
            "vt_commerce",
            "t",
            "ALTER TABLE t ADD COLUMN c INT",
            DdlStrategySetting::new(DdlStrategy::Vitess, options),
            DdlAction::Alter,
            "",
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn interval_index_clamps_at_last_entry() {
        assert_eq!(cutover_attempt_interval(0), Duration::ZERO);
        assert_eq!(cutover_attempt_interval(1), Duration::from_secs(60));
        assert_eq!(cutover_attempt_interval(4), Duration::from_secs(1800));
        assert_eq!(cutover_attempt_interval(100), Duration::from_secs(1800));
    }

    #[test]
    fn first_attempt_is_immediate() {
        let decision = evaluate_cutover_attempt(&migration(""), now());
        assert!(decision.should_attempt);
        assert!(!decision.should_force);
    }

    #[test]
    fn backoff_holds_until_interval_elapses() {
        let mut m = migration("");
        m.cutover_attempts = 2;
        m.last_cutover_attempt_timestamp = Some(now() - chrono::Duration::seconds(60));
        assert!(!evaluate_cutover_attempt(&m, now()).should_attempt);
        m.last_cutover_attempt_timestamp = Some(now() - chrono::Duration::seconds(301));
        assert!(evaluate_cutover_attempt(&m, now()).should_attempt);
    }

    #[test]
    fn force_cutover_flag_overrides_backoff() {
        let mut m = migration("");
        m.cutover_attempts = 4;
        m.last_cutover_attempt_timestamp = Some(now());
        m.force_cutover = true;
        let decision = evaluate_cutover_attempt(&m, now());
        assert!(decision.should_attempt);
        assert!(decision.should_force);
    }

    #[test]
    fn force_after_zero_forces_immediately() {
        let m = migration("--force-cut-over-after=0s");
        let decision = evaluate_cutover_attempt(&m, now());
        assert!(decision.should_force);
    }

    #[test]
    fn force_after_elapses_from_ready_to_complete() {
        let mut m = migration("--force-cut-over-after=10m");
        m.cutover_attempts = 4;
        m.last_cutover_attempt_timestamp = Some(now());
        m.ready_to_complete_timestamp = Some(now() - chrono::Duration::minutes(11));
        assert!(evaluate_cutover_attempt(&m, now()).should_force);
        m.ready_to_complete_timestamp = Some(now() - chrono::Duration::minutes(5));
        assert!(!evaluate_cutover_attempt(&m, now()).should_attempt);
    }
}
