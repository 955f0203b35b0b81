//! User contributions and progression.
//!
//! The ledger queues contributions while a trace is processed. Nothing touches
//! the user until the whole trace is done; then the queued contributions,
//! their points and the single level check are applied in one read-modify-write.

use chrono::NaiveDateTime;

use crate::config::ProgressionConfig;
use crate::trace::Action;

pub type UserId = String;

/// One action a user took on a segment. The segment is referenced by id only.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub segment_id: u64,
    pub action: Action,
    pub timestamp: NaiveDateTime,
}

/// Progression fields of a user account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub points: u32,
    pub level: u32,
    pub contributions: Vec<Contribution>,
}

impl User {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            points: 0,
            level: 1,
            contributions: Vec::new(),
        }
    }
}

/// Dashboard view of a user's progression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct UserProgress {
    pub level: u32,
    pub points: u32,
    pub contributions: u32,
    pub found_parking: u32,
    pub drove_by: u32,
}

impl From<&User> for UserProgress {
    fn from(user: &User) -> Self {
        let found_parking = user
            .contributions
            .iter()
            .filter(|c| c.action == Action::FoundParking)
            .count() as u32;

        Self {
            level: user.level,
            points: user.points,
            contributions: user.contributions.len() as u32,
            found_parking,
            drove_by: user.contributions.len() as u32 - found_parking,
        }
    }
}

/// Contributions gathered over one trace, applied to the user in one step.
#[derive(Debug, Clone)]
pub struct ContributionLedger {
    config: ProgressionConfig,
    pending: Vec<Contribution>,
}

impl ContributionLedger {
    pub fn new(config: ProgressionConfig) -> Self {
        Self { config, pending: Vec::new() }
    }

    /// Queue a contribution for the trace.
    pub fn record(&mut self, segment_id: u64, action: Action, timestamp: NaiveDateTime) {
        self.pending.push(Contribution { segment_id, action, timestamp });
    }

    pub fn recorded(&self) -> u32 {
        self.pending.len() as u32
    }

    pub fn pending(&self) -> &[Contribution] {
        &self.pending
    }

    /// Append the queued contributions, award points, then run the
    /// once-per-trace level check. Returns whether the user levelled up.
    pub fn apply_to(&self, user: &mut User) -> bool {
        for contribution in &self.pending {
            user.contributions.push(contribution.clone());
            user.points = user.points.saturating_add(self.config.points_per_contribution);
        }

        let level_up = !self.pending.is_empty() && user.points >= self.config.level_up_threshold;
        if level_up {
            user.level += 1;
            user.points = 0;
        }
        level_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn test_new_user() {
        let user = User::new("u1");
        assert_eq!(user.level, 1);
        assert_eq!(user.points, 0);
        assert!(user.contributions.is_empty());
    }

    #[test]
    fn test_records_and_levels_up_once() {
        let config = ProgressionConfig::default();
        let mut ledger = ContributionLedger::new(config.clone());

        for id in 0..3 {
            ledger.record(id, Action::DroveBy, now());
        }
        ledger.record(3, Action::FoundParking, now());
        assert_eq!(ledger.recorded(), 4);

        let mut user = User::new("u1");
        let level_up = ledger.apply_to(&mut user);
        assert!(level_up);
        assert_eq!(user.level, 2);
        assert_eq!(user.points, 0);
        assert_eq!(user.contributions.len(), 4);
        assert_eq!(user.contributions[3].action, Action::FoundParking);
    }

    #[test]
    fn test_points_accumulate_below_threshold() {
        let config = ProgressionConfig { points_per_contribution: 5, level_up_threshold: 100 };
        let mut ledger = ContributionLedger::new(config.clone());
        for id in 0..4 {
            ledger.record(id, Action::DroveBy, now());
        }

        let mut user = User::new("u1");
        assert!(!ledger.apply_to(&mut user));
        assert_eq!(user.points, 20);
        assert_eq!(user.level, 1);
    }

    #[test]
    fn test_threshold_crossed_on_later_trace() {
        let config = ProgressionConfig { points_per_contribution: 5, level_up_threshold: 10 };
        let mut user = User::new("u1");

        let mut first = ContributionLedger::new(config.clone());
        first.record(1, Action::FoundParking, now());
        assert!(!first.apply_to(&mut user));
        assert_eq!(user.points, 5);

        let mut second = ContributionLedger::new(config.clone());
        second.record(2, Action::FoundParking, now());
        assert!(second.apply_to(&mut user));
        assert_eq!(user.level, 2);
        assert_eq!(user.points, 0);
    }

    #[test]
    fn test_empty_ledger_never_levels_up() {
        let config = ProgressionConfig { points_per_contribution: 5, level_up_threshold: 0 };
        let ledger = ContributionLedger::new(config.clone());
        let mut user = User::new("u1");
        assert!(!ledger.apply_to(&mut user));
        assert_eq!(user.level, 1);
    }

    #[test]
    fn test_progress_summary() {
        let config = ProgressionConfig { points_per_contribution: 5, level_up_threshold: 100 };
        let mut ledger = ContributionLedger::new(config.clone());
        ledger.record(1, Action::DroveBy, now());
        ledger.record(2, Action::DroveBy, now());
        ledger.record(3, Action::FoundParking, now());
        let mut user = User::new("u1");
        ledger.apply_to(&mut user);

        let progress = UserProgress::from(&user);
        assert_eq!(progress.contributions, 3);
        assert_eq!(progress.found_parking, 1);
        assert_eq!(progress.drove_by, 2);
        assert_eq!(progress.points, 15);
    }
}
