//! Per-target circuit breakers.
//!
//! After `failure_threshold` consecutive fetch failures a target's circuit
//! opens and fetches fail fast until the cooldown passes. The first fetch
//! after the cooldown is a trial: success closes the circuit, failure
//! reopens it for another cooldown.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::models::CircuitPolicy;

#[derive(Debug, Clone, Copy, Default)]
struct Circuit {
    failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct CircuitBreakers {
    circuits: Mutex<HashMap<String, Circuit>>,
}

impl CircuitBreakers {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_circuits<R>(&self, f: impl FnOnce(&mut HashMap<String, Circuit>) -> R) -> R {
        let mut guard = self.circuits.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// `Err(remaining)` while the circuit is open.
    pub fn check(&self, target_id: &str, policy: &CircuitPolicy, now: Instant) -> Result<(), Duration> {
        self.with_circuits(|circuits| match circuits.get(target_id) {
            Some(Circuit {
                opened_at: Some(opened),
                ..
            }) => {
                match opened.checked_add(policy.cooldown) {
                    Some(reopens) if now >= reopens => Ok(()),
                    Some(reopens) => Err(reopens - now),
                    None => Err(policy.cooldown),
                }
            }
            _ => Ok(()),
        })
    }

    pub fn record_success(&self, target_id: &str) {
        self.with_circuits(|circuits| {
            if let Some(circuit) = circuits.remove(target_id) {
                if circuit.opened_at.is_some() {
                    info!("{}: circuit closed", target_id);
                }
            }
        })
    }

    /// Returns true when this failure opened (or reopened) the circuit.
    pub fn record_failure(&self, target_id: &str, policy: &CircuitPolicy, now: Instant) -> bool {
        self.with_circuits(|circuits| {
            let circuit = circuits.entry(target_id.to_string()).or_default();
            circuit.failures = circuit.failures.saturating_add(1);
            if policy.failure_threshold > 0 && circuit.failures >= policy.failure_threshold {
                circuit.opened_at = Some(now);
                warn!(
                    "{}: circuit open after {} consecutive failures, cooling down for {:?}",
                    target_id, circuit.failures, policy.cooldown
                );
                true
            } else {
                false
            }
        })
    }

    pub fn is_open(&self, target_id: &str, policy: &CircuitPolicy, now: Instant) -> bool {
        self.check(target_id, policy, now).is_err()
    }
}
