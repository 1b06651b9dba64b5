use super::listener::{FnListener, Listeners, StateChangeListener};
use super::types::{BreakerConfig, BreakerMetrics, BreakerState};
use super::window::{Outcome, RollingWindow};
use crate::error::{BreakerOpen, CallError, Result};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Decides whether an operation's error counts against the breaker
pub type Classifier = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Proof of admission returned by [`Breaker::admit`].
///
/// Carries the state the call was admitted under and the transition
/// generation, so a cancelled trial only frees a slot in the half-open
/// episode that granted it.
#[must_use = "an admitted call must report an outcome or be released"]
#[derive(Debug)]
pub struct Permit {
    admitted_in: BreakerState,
    generation: u64,
}

impl Permit {
    /// State the breaker was in when this call was admitted
    pub fn admitted_in(&self) -> BreakerState {
        self.admitted_in
    }
}

/// Resolve the state an admission should be evaluated against.
///
/// An open breaker whose recovery timeout has elapsed is effectively half-open.
pub fn effective_state(
    state: BreakerState,
    opened_at: Option<Instant>,
    now: Instant,
    recovery_timeout: Duration,
) -> BreakerState {
    match (state, opened_at) {
        (BreakerState::Open, Some(at)) if now.saturating_duration_since(at) >= recovery_timeout => {
            BreakerState::HalfOpen
        }
        _ => state,
    }
}

/// Circuit breaker guarding a single dependency
pub struct Breaker {
    /// Configuration
    config: BreakerConfig,
    /// Failure classifier used by `call`
    classifier: Classifier,
    /// Mutable state, one lock for every read-modify-write
    state: Mutex<State>,
    /// Dependency identifier
    name: String,
}

#[derive(Debug)]
struct State {
    /// Current circuit state
    circuit_state: BreakerState,
    /// Incremented on every transition
    generation: u64,
    /// Number of consecutive failures in closed state
    consecutive_failures: u32,
    /// Trial calls admitted in the current half-open episode
    half_open_trials: u32,
    /// Successful trial calls in the current half-open episode
    half_open_successes: u32,
    /// Time when the circuit was last opened
    opened_at: Option<Instant>,
    /// Time of the most recent failure
    last_failure_at: Option<Instant>,
    /// Samples for error-rate tripping
    window: RollingWindow,
    /// Registered observers
    listeners: Listeners,
    /// Lifetime counters
    counters: Counters,
}

#[derive(Debug, Default, Clone)]
struct Counters {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    rejected_requests: u64,
    cancelled_requests: u64,
    timeout_count: u64,
    opened_count: u64,
    half_opened_count: u64,
    closed_count: u64,
}

impl Breaker {
    /// Create a new circuit breaker.
    ///
    /// The config is trusted as-is. A config outside the ranges checked by
    /// [`BreakerConfig::validate`] can leave the breaker stuck half-open, for
    /// example a success threshold above the trial limit. Use
    /// [`Breaker::try_new`] for configs that have not been validated.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            error_rate_threshold = config.error_rate_threshold,
            recovery_timeout_ms = config.recovery_timeout_ms,
            half_open_trial_limit = config.half_open_trial_limit,
            "Creating circuit breaker"
        );

        Self {
            state: Mutex::new(State {
                circuit_state: BreakerState::Closed,
                generation: 0,
                consecutive_failures: 0,
                half_open_trials: 0,
                half_open_successes: 0,
                opened_at: None,
                last_failure_at: None,
                window: RollingWindow::new(config.rolling_window()),
                listeners: Listeners::default(),
                counters: Counters::default(),
            }),
            classifier: Arc::new(|_| true),
            config,
            name,
        }
    }

    /// Create a new circuit breaker after validating its configuration
    pub fn try_new(name: impl Into<String>, config: BreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(name, config))
    }

    /// Replace the failure classifier used by [`Breaker::call`].
    ///
    /// Errors for which the classifier returns `false` are recorded as
    /// successes but still returned to the caller.
    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Register a listener closure for state transitions
    pub fn add_state_change_listener<F>(&self, listener: F)
    where
        F: Fn(&str, BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener(listener)));
    }

    /// Register a (possibly fallible) listener for state transitions
    pub fn add_listener(&self, listener: Arc<dyn StateChangeListener>) {
        self.lock().listeners.push(listener);
    }

    /// Check whether a call may proceed.
    ///
    /// A half-open permit holds one of the episode's trial slots until its
    /// outcome is recorded or it is handed to [`Breaker::release`]. Dropping
    /// it silently keeps the slot taken for the rest of the episode;
    /// [`Breaker::call`] releases it automatically.
    pub fn admit(&self) -> std::result::Result<Permit, BreakerOpen> {
        let mut state = self.lock();
        let now = Instant::now();

        let effective = effective_state(
            state.circuit_state,
            state.opened_at,
            now,
            self.config.recovery_timeout(),
        );
        if effective != state.circuit_state {
            self.transition(&mut state, effective, now);
        }

        match state.circuit_state {
            BreakerState::Closed => {
                state.counters.total_requests += 1;
                Ok(Permit {
                    admitted_in: BreakerState::Closed,
                    generation: state.generation,
                })
            }
            BreakerState::Open => {
                state.counters.rejected_requests += 1;
                let time_remaining = state.opened_at.map(|at| {
                    self.config
                        .recovery_timeout()
                        .saturating_sub(now.saturating_duration_since(at))
                });
                debug!(
                    breaker = %self.name,
                    time_remaining = ?time_remaining,
                    "Circuit breaker open, rejecting call"
                );
                Err(self.rejection(BreakerState::Open))
            }
            BreakerState::HalfOpen => {
                if state.half_open_trials < self.config.half_open_trial_limit {
                    state.half_open_trials += 1;
                    state.counters.total_requests += 1;
                    debug!(
                        breaker = %self.name,
                        half_open_trials = state.half_open_trials,
                        max = self.config.half_open_trial_limit,
                        "Allowing half-open trial call"
                    );
                    Ok(Permit {
                        admitted_in: BreakerState::HalfOpen,
                        generation: state.generation,
                    })
                } else {
                    state.counters.rejected_requests += 1;
                    debug!(
                        breaker = %self.name,
                        "Half-open trial limit reached, rejecting"
                    );
                    Err(self.rejection(BreakerState::HalfOpen))
                }
            }
        }
    }

    /// Record a successful call.
    ///
    /// Without a permit the success cannot be tied to an episode, so while
    /// half-open it counts toward closing the breaker. Prefer
    /// [`Breaker::record_success_with`] for manually admitted calls.
    pub fn record_success(&self, duration: Duration) {
        let mut state = self.lock();
        self.on_success(&mut state, duration, None);
    }

    /// Record a successful call admitted with `permit`.
    ///
    /// Only trials admitted in the current half-open episode count toward
    /// closing the breaker.
    pub fn record_success_with(&self, permit: Permit, duration: Duration) {
        let mut state = self.lock();
        self.on_success(&mut state, duration, Some(&permit));
    }

    /// Record a failed call.
    ///
    /// The error must already have been classified as a failure.
    pub fn record_failure<E>(&self, error: &E)
    where
        E: fmt::Display + ?Sized,
    {
        let mut state = self.lock();
        self.on_failure(&mut state, &error);
    }

    /// Record a call that the caller abandoned after its own deadline
    pub fn record_timeout(&self, elapsed: Duration) {
        let mut state = self.lock();
        state.counters.timeout_count += 1;
        self.on_failure(&mut state, &format!("timed out after {:?}", elapsed));
    }

    /// Give back a permit whose call produced no outcome.
    ///
    /// The call is counted as cancelled, not as a success or failure. A trial
    /// slot is freed only if the half-open episode that granted it is still
    /// running.
    pub fn release(&self, permit: Permit) {
        let mut state = self.lock();
        state.counters.cancelled_requests += 1;

        if permit.admitted_in == BreakerState::HalfOpen
            && state.circuit_state == BreakerState::HalfOpen
            && state.generation == permit.generation
        {
            state.half_open_trials = state.half_open_trials.saturating_sub(1);
            debug!(
                breaker = %self.name,
                half_open_trials = state.half_open_trials,
                "Released cancelled half-open trial"
            );
        }
    }

    /// Run `op` through the breaker, classifying errors with the breaker's classifier
    pub async fn call<F, Fut, T, E>(&self, op: F) -> std::result::Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: StdError + 'static,
    {
        let classifier = self.classifier.clone();
        self.call_with_classifier(op, move |e: &E| classifier(e as &(dyn StdError + 'static)))
            .await
    }

    /// Run `op` through the breaker with a call-specific failure predicate.
    ///
    /// The operation's own result or error is returned unchanged. If the
    /// returned future is dropped after admission, or `op` panics, the call
    /// is released as cancelled.
    pub async fn call_with_classifier<F, Fut, T, E, C>(
        &self,
        op: F,
        is_failure: C,
    ) -> std::result::Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
        C: FnOnce(&E) -> bool,
    {
        let permit = self.admit()?;
        let guard = CallGuard {
            breaker: self,
            permit: Some(permit),
        };
        let started = Instant::now();

        let result = op().await;
        let permit = guard.complete();

        match &result {
            Ok(_) => self.record_outcome_success(permit, started.elapsed()),
            Err(e) => {
                if is_failure(e) {
                    self.record_failure(e);
                } else {
                    debug!(breaker = %self.name, error = %e, "Error not classified as failure");
                    self.record_outcome_success(permit, started.elapsed());
                }
            }
        }

        result.map_err(CallError::Inner)
    }

    /// Force the breaker closed, clearing all counters and samples
    pub fn reset(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        info!(breaker = %self.name, "Circuit breaker reset");
        if state.circuit_state == BreakerState::Closed {
            state.consecutive_failures = 0;
            state.window.clear();
        } else {
            self.transition(&mut state, BreakerState::Closed, now);
        }
    }

    /// Force the breaker open, starting the recovery timeout now
    pub fn force_open(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        info!(breaker = %self.name, "Circuit breaker forced open");
        if state.circuit_state == BreakerState::Open {
            state.opened_at = Some(now);
        } else {
            self.transition(&mut state, BreakerState::Open, now);
        }
    }

    /// Get current state
    pub fn state(&self) -> BreakerState {
        self.lock().circuit_state
    }

    /// Consistent snapshot of state and counters
    pub fn metrics(&self) -> BreakerMetrics {
        let mut state = self.lock();
        let now = Instant::now();
        let error_rate = state
            .window
            .error_rate(now, self.config.min_samples_for_rate);

        BreakerMetrics {
            name: self.name.clone(),
            state: state.circuit_state,
            consecutive_failures: state.consecutive_failures,
            success_count: state.half_open_successes,
            failure_threshold: self.config.failure_threshold,
            half_open_trial_count: state.half_open_trials,
            half_open_success_threshold: self.config.half_open_success_threshold,
            last_failure_time: state.last_failure_at,
            since_last_failure: state
                .last_failure_at
                .map(|at| now.saturating_duration_since(at)),
            window_samples: state.window.len(),
            window_failures: state.window.failures(),
            error_rate,
            total_requests: state.counters.total_requests,
            successful_requests: state.counters.successful_requests,
            failed_requests: state.counters.failed_requests,
            rejected_requests: state.counters.rejected_requests,
            cancelled_requests: state.counters.cancelled_requests,
            timeout_count: state.counters.timeout_count,
            opened_count: state.counters.opened_count,
            half_opened_count: state.counters.half_opened_count,
            closed_count: state.counters.closed_count,
        }
    }

    fn on_failure(&self, state: &mut State, error: &dyn fmt::Display) {
        let now = Instant::now();
        state.counters.failed_requests += 1;
        state.last_failure_at = Some(now);
        state.window.record(now, Outcome::Failure);

        match state.circuit_state {
            BreakerState::Closed => {
                state.consecutive_failures += 1;
                let error_rate = state
                    .window
                    .error_rate(now, self.config.min_samples_for_rate);

                debug!(
                    breaker = %self.name,
                    consecutive_failures = state.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    error_rate,
                    error = %error,
                    "Call failed in closed state"
                );

                let samples = state.window.len();
                if state.consecutive_failures >= self.config.failure_threshold
                    || (samples >= self.config.min_samples_for_rate as usize
                        && error_rate >= self.config.error_rate_threshold)
                {
                    self.transition(state, BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => {
                warn!(
                    breaker = %self.name,
                    error = %error,
                    "Half-open trial call failed, reopening circuit"
                );
                self.transition(state, BreakerState::Open, now);
            }
            BreakerState::Open => {
                debug!(breaker = %self.name, error = %error, "Recording failure in open state");
            }
        }
    }

    fn record_outcome_success(&self, permit: Option<Permit>, duration: Duration) {
        match permit {
            Some(permit) => self.record_success_with(permit, duration),
            None => self.record_success(duration),
        }
    }

    fn on_success(&self, state: &mut State, duration: Duration, permit: Option<&Permit>) {
        let now = Instant::now();
        state.counters.successful_requests += 1;
        state.window.record(now, Outcome::Success);

        match state.circuit_state {
            BreakerState::Closed => {
                state.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                let stale = permit.map_or(false, |p| {
                    p.admitted_in != BreakerState::HalfOpen || p.generation != state.generation
                });
                if stale {
                    debug!(
                        breaker = %self.name,
                        "Ignoring success from a call admitted before this half-open episode"
                    );
                    return;
                }

                state.half_open_successes += 1;

                debug!(
                    breaker = %self.name,
                    half_open_successes = state.half_open_successes,
                    threshold = self.config.half_open_success_threshold,
                    duration_ms = duration.as_millis() as u64,
                    "Half-open trial call succeeded"
                );

                if state.half_open_successes >= self.config.half_open_success_threshold {
                    self.transition(state, BreakerState::Closed, now);
                }
            }
            BreakerState::Open => {
                // Late result of a call admitted before the trip
                debug!(breaker = %self.name, "Recording success in open state");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Listener panics are caught before they can poison the lock
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rejection(&self, state: BreakerState) -> BreakerOpen {
        BreakerOpen {
            name: self.name.clone(),
            state,
        }
    }

    /// Move to `to`, applying its entry side effects and notifying listeners
    fn transition(&self, state: &mut State, to: BreakerState, now: Instant) {
        let from = state.circuit_state;
        if from == to {
            return;
        }

        state.circuit_state = to;
        state.generation += 1;
        state.half_open_trials = 0;
        state.half_open_successes = 0;

        match to {
            BreakerState::Open => {
                info!(
                    breaker = %self.name,
                    %from,
                    consecutive_failures = state.consecutive_failures,
                    "Circuit breaker opening"
                );
                state.opened_at = Some(now);
                state.counters.opened_count += 1;
            }
            BreakerState::HalfOpen => {
                info!(
                    breaker = %self.name,
                    recovery_timeout = ?self.config.recovery_timeout(),
                    "Circuit breaker transitioning to half-open"
                );
                state.counters.half_opened_count += 1;
            }
            BreakerState::Closed => {
                info!(breaker = %self.name, %from, "Circuit breaker closing");
                state.opened_at = None;
                state.consecutive_failures = 0;
                state.window.clear();
                state.counters.closed_count += 1;
            }
        }

        state.listeners.notify(&self.name, from, to);
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Releases the permit if the wrapped call never reports back
struct CallGuard<'a> {
    breaker: &'a Breaker,
    permit: Option<Permit>,
}

impl CallGuard<'_> {
    /// Hand the permit back so the caller can record its outcome
    fn complete(mut self) -> Option<Permit> {
        self.permit.take()
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            debug!(breaker = %self.breaker.name, "Admitted call dropped before completion");
            self.breaker.release(permit);
        }
    }
}
