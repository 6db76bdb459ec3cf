//! Case clock state.
//!
//! The simulation case reports a tick counter and a status string. A case is
//! finished once the tick reaches the configured limit or the status leaves
//! `active`/`running`; that condition is sticky.

use serde::{Deserialize, Serialize};

/// Case status as reported by the server, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    /// No successful case poll yet
    Unknown,
    Active,
    Running,
    Stopped,
    /// Any other status, as reported (trimmed)
    Other(String),
}

impl CaseStatus {
    /// Parses a raw status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_lowercase().as_str() {
            "active" => CaseStatus::Active,
            "running" => CaseStatus::Running,
            "stopped" => CaseStatus::Stopped,
            "unknown" | "" => CaseStatus::Unknown,
            _ => CaseStatus::Other(trimmed.to_string()),
        }
    }

    /// Returns true for statuses under which polling continues.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, CaseStatus::Active | CaseStatus::Running)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            CaseStatus::Unknown => "unknown",
            CaseStatus::Active => "active",
            CaseStatus::Running => "running",
            CaseStatus::Stopped => "stopped",
            CaseStatus::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw result of one case poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub tick: i64,
    pub status: String,
}

impl CaseReport {
    pub fn new(tick: i64, status: impl Into<String>) -> Self {
        Self {
            tick,
            status: status.into(),
        }
    }
}

/// Last known case clock with the sticky finished flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseState {
    tick: i64,
    status: CaseStatus,
    finished: bool,
}

impl Default for CaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseState {
    /// Initial state: tick 0, unknown status, not finished.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: 0,
            status: CaseStatus::Unknown,
            finished: false,
        }
    }

    #[must_use]
    pub fn tick(&self) -> i64 {
        self.tick
    }

    #[must_use]
    pub fn status(&self) -> &CaseStatus {
        &self.status
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Returns true if the given clock reading ends the case.
    #[must_use]
    pub fn ends_case(tick: i64, status: &CaseStatus, tick_limit: i64) -> bool {
        tick >= tick_limit || !status.is_live()
    }

    /// Applies a successful case poll.
    ///
    /// Returns true if this report is the one that finished the case.
    pub fn apply(&mut self, report: &CaseReport, tick_limit: i64) -> bool {
        self.tick = report.tick;
        self.status = CaseStatus::parse(&report.status);

        if self.finished {
            return false;
        }
        self.finished = Self::ends_case(self.tick, &self.status, tick_limit);
        self.finished
    }

    /// Ticks left before the limit, never negative.
    #[must_use]
    pub fn remaining_ticks(&self, tick_limit: i64) -> i64 {
        (tick_limit - self.tick).max(0)
    }
}
