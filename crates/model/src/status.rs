use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a schema migration.
///
/// Transitions are monotone toward a terminal state; the only legal moves are
/// `queued -> ready -> running -> {complete, failed, cancelled}` plus the
/// explicit retry of a terminal migration back to `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Queued,
    Ready,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Queued => "queued",
            MigrationStatus::Ready => "ready",
            MigrationStatus::Running => "running",
            MigrationStatus::Complete => "complete",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Cancelled => "cancelled",
        }
    }

    /// A terminal migration will never run again unless explicitly retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Complete | MigrationStatus::Failed | MigrationStatus::Cancelled
        )
    }

    /// Pending means the migration still demands executor attention.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MigrationStatus::Queued),
            "ready" => Ok(MigrationStatus::Ready),
            "running" => Ok(MigrationStatus::Running),
            "complete" => Ok(MigrationStatus::Complete),
            "failed" => Ok(MigrationStatus::Failed),
            "cancelled" => Ok(MigrationStatus::Cancelled),
            other => Err(format!("unknown migration status: {other}")),
        }
    }
}

/// Coarse classification of the submitted DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DdlAction {
    Create,
    Drop,
    Alter,
    Revert,
}

impl DdlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DdlAction::Create => "create",
            DdlAction::Drop => "drop",
            DdlAction::Alter => "alter",
            DdlAction::Revert => "revert",
        }
    }

    /// The action a REVERT of this action performs.
    /// `alter` reverts via another `alter`; `create` and `drop` invert.
    pub fn inverse(&self) -> Option<DdlAction> {
        match self {
            DdlAction::Create => Some(DdlAction::Drop),
            DdlAction::Drop => Some(DdlAction::Create),
            DdlAction::Alter => Some(DdlAction::Alter),
            DdlAction::Revert => None,
        }
    }
}

impl fmt::Display for DdlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DdlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(DdlAction::Create),
            "drop" => Ok(DdlAction::Drop),
            "alter" => Ok(DdlAction::Alter),
            "revert" => Ok(DdlAction::Revert),
            other => Err(format!("unknown ddl action: {other}")),
        }
    }
}

/// Role of the local tablet. Only a primary may mutate schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    Primary,
    Replica,
}

impl TabletType {
    pub fn is_primary(&self) -> bool {
        matches!(self, TabletType::Primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            MigrationStatus::Queued,
            MigrationStatus::Ready,
            MigrationStatus::Running,
            MigrationStatus::Complete,
            MigrationStatus::Failed,
            MigrationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MigrationStatus>(), Ok(status));
        }
        assert!("paused".parse::<MigrationStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!MigrationStatus::Queued.is_terminal());
        assert!(!MigrationStatus::Ready.is_terminal());
        assert!(!MigrationStatus::Running.is_terminal());
        assert!(MigrationStatus::Complete.is_terminal());
        assert!(MigrationStatus::Failed.is_terminal());
        assert!(MigrationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn revert_inverts_actions() {
        assert_eq!(DdlAction::Create.inverse(), Some(DdlAction::Drop));
        assert_eq!(DdlAction::Drop.inverse(), Some(DdlAction::Create));
        assert_eq!(DdlAction::Alter.inverse(), Some(DdlAction::Alter));
        assert_eq!(DdlAction::Revert.inverse(), None);
    }
}
