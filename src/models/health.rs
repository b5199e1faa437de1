//! Per-target health bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CircuitPolicy;

/// Coarse health of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown,
    Healthy,
    /// Last run succeeded but some values could not be parsed.
    Warning,
    Error,
    /// Operator-set; never entered or left automatically.
    Disabled,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "healthy" => Some(Self::Healthy),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters from the last completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub facts_found: u64,
    pub malformed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

/// Health row for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub target_id: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
    /// When the last run finished, successfully or not.
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Set while a run is in flight.
    pub run_started_at: Option<DateTime<Utc>>,
    pub disabled_reason: Option<String>,
    pub stats: RunStats,
    /// Hostname of the process that last wrote this row.
    pub host: Option<String>,
    pub version: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn new(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            state: HealthState::Unknown,
            consecutive_failures: 0,
            last_run_at: None,
            last_success_at: None,
            last_error: None,
            last_error_at: None,
            run_started_at: None,
            disabled_reason: None,
            stats: RunStats::default(),
            host: get_hostname(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.host = get_hostname();
        self.version = Some(env!("CARGO_PKG_VERSION").to_string());
    }

    /// Mark a run as in flight.
    pub fn begin_run(&mut self, now: DateTime<Utc>) {
        self.run_started_at = Some(now);
        self.touch(now);
    }

    /// Record a completed run. Malformed values downgrade the result to `warning`.
    pub fn record_success(&mut self, stats: RunStats, now: DateTime<Utc>) {
        self.run_started_at = None;
        self.last_run_at = Some(now);
        self.last_success_at = Some(now);
        self.consecutive_failures = 0;
        if self.state != HealthState::Disabled {
            self.state = if stats.malformed > 0 {
                HealthState::Warning
            } else {
                HealthState::Healthy
            };
        }
        self.stats = stats;
        self.touch(now);
    }

    /// Record a failed run.
    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.run_started_at = None;
        self.last_run_at = Some(now);
        self.last_error = Some(error.to_string());
        self.last_error_at = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.state != HealthState::Disabled {
            self.state = HealthState::Error;
        }
        self.touch(now);
    }

    /// Clear the in-flight marker after cancellation without judging the run.
    pub fn abort_run(&mut self, now: DateTime<Utc>) {
        self.run_started_at = None;
        self.touch(now);
    }

    pub fn disable(&mut self, reason: Option<&str>, now: DateTime<Utc>) {
        self.state = HealthState::Disabled;
        self.disabled_reason = reason.map(|s| s.to_string());
        self.touch(now);
    }

    /// Return a disabled target to `unknown` with a clean failure count.
    pub fn enable(&mut self, now: DateTime<Utc>) {
        if self.state == HealthState::Disabled {
            self.state = HealthState::Unknown;
            self.consecutive_failures = 0;
            self.disabled_reason = None;
        }
        self.touch(now);
    }

    pub fn is_running(&self) -> bool {
        self.run_started_at.is_some()
    }

    /// Whether an in-flight run has exceeded `timeout`.
    pub fn is_overdue(&self, timeout: std::time::Duration, now: DateTime<Utc>) -> bool {
        match (self.run_started_at, chrono::Duration::from_std(timeout)) {
            (Some(started), Ok(timeout)) => now - started > timeout,
            _ => false,
        }
    }

    /// Force an overdue run to `error`. Returns true if the row changed.
    pub fn expire_overdue(&mut self, timeout: std::time::Duration, now: DateTime<Utc>) -> bool {
        if !self.is_overdue(timeout, now) {
            return false;
        }
        self.record_failure("run abandoned", now);
        true
    }

    pub fn can_run(&self) -> bool {
        self.state != HealthState::Disabled
    }

    /// When a tripped circuit allows the next trial run. `None` while the
    /// failure count is below the policy threshold.
    pub fn circuit_open_until(&self, policy: &CircuitPolicy) -> Option<DateTime<Utc>> {
        if policy.failure_threshold == 0 || self.consecutive_failures < policy.failure_threshold {
            return None;
        }
        let last_error = self.last_error_at?;
        match chrono::Duration::from_std(policy.cooldown) {
            Ok(cooldown) => Some(
                last_error
                    .checked_add_signed(cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            Err(_) => Some(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn needs_alert(&self, threshold: u32) -> bool {
        threshold > 0 && self.state == HealthState::Error && self.consecutive_failures >= threshold
    }
}

/// Get the current hostname.
fn get_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats(malformed: u64) -> RunStats {
        RunStats {
            facts_found: 2,
            malformed,
            ..Default::default()
        }
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            HealthState::Unknown,
            HealthState::Healthy,
            HealthState::Warning,
            HealthState::Error,
            HealthState::Disabled,
        ] {
            assert_eq!(HealthState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(HealthState::from_str("running"), None);
    }

    #[test]
    fn test_circuit_opens_from_stored_failures() {
        let policy = CircuitPolicy {
            failure_threshold: 2,
            cooldown: Duration::from_secs(600),
        };
        let now = Utc::now();
        let mut status = HealthStatus::new("t");

        status.record_failure("HTTP 500", now);
        assert_eq!(status.circuit_open_until(&policy), None);

        status.record_failure("HTTP 500", now);
        assert_eq!(
            status.circuit_open_until(&policy),
            Some(now + chrono::Duration::seconds(600))
        );

        status.record_success(stats(0), now);
        assert_eq!(status.circuit_open_until(&policy), None);

        let never = CircuitPolicy {
            failure_threshold: 0,
            ..policy
        };
        status.record_failure("HTTP 500", now);
        status.record_failure("HTTP 500", now);
        assert_eq!(status.circuit_open_until(&never), None);
    }

    #[test]
    fn test_first_success_is_healthy() {
        let mut status = HealthStatus::new("qld-stats");
        assert_eq!(status.state, HealthState::Unknown);

        status.record_success(stats(0), Utc::now());
        assert_eq!(status.state, HealthState::Healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_success_at.is_some());
        assert!(status.version.is_some());
    }

    #[test]
    fn test_failures_accumulate_then_reset() {
        let mut status = HealthStatus::new("qld-stats");
        for _ in 0..3 {
            status.record_failure("connection refused", Utc::now());
        }
        assert_eq!(status.state, HealthState::Error);
        assert_eq!(status.consecutive_failures, 3);
        assert_eq!(status.last_error.as_deref(), Some("connection refused"));

        status.record_success(stats(0), Utc::now());
        assert_eq!(status.state, HealthState::Healthy);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn test_malformed_values_give_warning() {
        let mut status = HealthStatus::new("t");
        status.record_failure("timeout", Utc::now());
        status.record_success(stats(1), Utc::now());
        assert_eq!(status.state, HealthState::Warning);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.stats.malformed, 1);
    }

    #[test]
    fn test_disabled_is_sticky() {
        let mut status = HealthStatus::new("t");
        status.disable(Some("source retired"), Utc::now());
        assert!(!status.can_run());

        status.record_success(stats(0), Utc::now());
        assert_eq!(status.state, HealthState::Disabled);
        status.record_failure("boom", Utc::now());
        assert_eq!(status.state, HealthState::Disabled);

        status.enable(Utc::now());
        assert_eq!(status.state, HealthState::Unknown);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.disabled_reason, None);
        assert!(status.can_run());
    }

    #[test]
    fn test_enable_leaves_other_states_alone() {
        let mut status = HealthStatus::new("t");
        status.record_failure("boom", Utc::now());
        status.enable(Utc::now());
        assert_eq!(status.state, HealthState::Error);
        assert_eq!(status.consecutive_failures, 1);
    }

    #[test]
    fn test_abort_clears_run_marker() {
        let mut status = HealthStatus::new("t");
        status.record_success(stats(0), Utc::now());
        status.begin_run(Utc::now());
        assert!(status.is_running());

        status.abort_run(Utc::now());
        assert!(!status.is_running());
        assert_eq!(status.state, HealthState::Healthy);
    }

    #[test]
    fn test_overdue_run_expires_to_error() {
        let now = Utc::now();
        let mut status = HealthStatus::new("t");
        status.begin_run(now - chrono::Duration::seconds(600));

        assert!(!status.is_overdue(Duration::from_secs(900), now));
        assert!(status.is_overdue(Duration::from_secs(300), now));
        assert!(status.expire_overdue(Duration::from_secs(300), now));
        assert_eq!(status.state, HealthState::Error);
        assert_eq!(status.last_error.as_deref(), Some("run abandoned"));
        assert!(!status.is_running());
        assert!(!status.expire_overdue(Duration::from_secs(300), now));
    }

    #[test]
    fn test_needs_alert() {
        let mut status = HealthStatus::new("t");
        status.record_failure("a", Utc::now());
        status.record_failure("b", Utc::now());
        assert!(!status.needs_alert(3));
        status.record_failure("c", Utc::now());
        assert!(status.needs_alert(3));
        assert!(!status.needs_alert(0));
    }
}
