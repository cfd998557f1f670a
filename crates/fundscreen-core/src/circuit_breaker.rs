//! Stops a fetch run from hammering a provider that is down.
//!
//! Every worker in a run shares one breaker per provider. Only outcomes that
//! say the provider itself is unhealthy count as failures: an unknown symbol
//! or a rejected request is a healthy answer. After the cooldown exactly one
//! trial call is let through; the rest keep failing fast until that trial
//! resolves.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::data_source::{SourceError, SourceErrorKind};

/// Coarse breaker state, used for provider health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive provider faults that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call is allowed.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Circuit {
    Closed { faults: u32 },
    Open { until: Instant },
    /// Cooldown elapsed and one trial call is in flight. A trial whose
    /// outcome never arrives is replaced after another cooldown.
    Trial { since: Instant },
}

/// Whether an error says the provider is unhealthy, as opposed to it having
/// answered a question it could not satisfy.
pub const fn is_provider_fault(kind: SourceErrorKind) -> bool {
    matches!(kind, SourceErrorKind::Unavailable | SourceErrorKind::RateLimited)
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuit: Mutex::new(Circuit::Closed { faults: 0 }),
        }
    }

    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits one upstream call, or fails fast while the circuit is open or
    /// a trial call is already in flight.
    pub fn permit(&self) -> Result<(), SourceError> {
        let mut circuit = self.circuit();
        match *circuit {
            Circuit::Closed { .. } => Ok(()),
            Circuit::Open { until } if Instant::now() >= until => {
                *circuit = Circuit::Trial {
                    since: Instant::now(),
                };
                Ok(())
            }
            Circuit::Trial { since } if since.elapsed() >= self.config.cooldown => {
                *circuit = Circuit::Trial {
                    since: Instant::now(),
                };
                Ok(())
            }
            Circuit::Open { until } => Err(SourceError::unavailable(format!(
                "circuit breaker is open for another {}s; skipping upstream call",
                until.saturating_duration_since(Instant::now()).as_secs()
            ))),
            Circuit::Trial { .. } => Err(SourceError::unavailable(
                "circuit breaker is waiting on a trial call; skipping upstream call",
            )),
        }
    }

    /// Feeds the outcome of a permitted call back into the breaker.
    pub fn observe<T>(&self, outcome: &Result<T, SourceError>) {
        match outcome {
            Err(error) if is_provider_fault(error.kind()) => self.record_fault(),
            _ => self.record_healthy(),
        }
    }

    fn record_healthy(&self) {
        let mut circuit = self.circuit();
        if !matches!(*circuit, Circuit::Closed { .. }) {
            info!("provider answered again; circuit closed");
        }
        *circuit = Circuit::Closed { faults: 0 };
    }

    fn record_fault(&self) {
        let mut circuit = self.circuit();
        let faults = match *circuit {
            Circuit::Closed { faults } => faults.saturating_add(1),
            Circuit::Trial { .. } => self.config.failure_threshold,
            Circuit::Open { .. } => return,
        };

        if faults >= self.config.failure_threshold {
            warn!(
                faults,
                cooldown_secs = self.config.cooldown.as_secs(),
                "provider keeps failing; circuit opened"
            );
            *circuit = Circuit::Open {
                until: Instant::now() + self.config.cooldown,
            };
        } else {
            *circuit = Circuit::Closed { faults };
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.circuit() {
            Circuit::Closed { .. } => CircuitState::Closed,
            Circuit::Open { .. } => CircuitState::Open,
            Circuit::Trial { .. } => CircuitState::HalfOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;

    fn breaker(failure_threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            cooldown,
        })
    }

    fn outage() -> Result<(), SourceError> {
        Err(SourceError::unavailable("yahoo returned status 503"))
    }

    #[test]
    fn opens_after_consecutive_provider_faults() {
        let breaker = breaker(2, Duration::from_secs(60));

        breaker.observe(&outage());
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.observe(&outage());
        assert_eq!(breaker.state(), CircuitState::Open);

        let error = breaker.permit().expect_err("open circuit fails fast");
        assert!(error.message().contains("circuit breaker is open"));
    }

    #[test]
    fn unknown_symbols_and_rejected_requests_are_healthy_answers() {
        let breaker = breaker(2, Duration::from_secs(60));
        let symbol = Symbol::parse("OLD").expect("valid symbol");

        for _ in 0..5 {
            breaker.observe::<()>(&Err(SourceError::not_found(&symbol)));
            breaker.observe::<()>(&Err(SourceError::invalid_request("bad range")));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.observe(&outage());
        breaker.observe::<()>(&Err(SourceError::not_found(&symbol)));
        breaker.observe(&outage());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn only_one_trial_call_is_admitted_after_cooldown() {
        let breaker = breaker(1, Duration::from_millis(200));
        breaker.observe(&outage());
        std::thread::sleep(Duration::from_millis(250));

        breaker.permit().expect("trial call admitted");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.permit().is_err());

        breaker.observe(&Ok(()));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.permit().is_ok());
    }

    #[test]
    fn failed_trial_call_reopens_immediately() {
        let breaker = breaker(3, Duration::from_millis(1));
        for _ in 0..3 {
            breaker.observe(&outage());
        }
        std::thread::sleep(Duration::from_millis(5));

        breaker.permit().expect("trial call admitted");
        breaker.observe(&outage());
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
